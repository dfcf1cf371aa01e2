pub mod analyze;
pub mod chat;
pub mod check_ai;
pub mod feedback;

use tracing::info;

use crate::{
    llm::{ChatMessage, CompletionGateway, GatewayError, GenerationParams, LlmRequest, LlmResponse},
    prompts::PromptPair,
};

/// Sends a system/user prompt pair through the gateway and logs token usage.
async fn run_prompt(
    llm: &dyn CompletionGateway,
    model: &str,
    params: GenerationParams,
    prompt: PromptPair,
) -> Result<LlmResponse, GatewayError> {
    let request = LlmRequest::new(
        model,
        vec![ChatMessage::system(prompt.system), ChatMessage::user(prompt.user)],
    )
    .with_params(params);

    let response = llm.complete(request).await?;
    info!(
        model = %response.model,
        prompt_tokens = response.token_usage.prompt_tokens,
        response_tokens = response.token_usage.response_tokens,
        "completion finished"
    );
    Ok(response)
}
