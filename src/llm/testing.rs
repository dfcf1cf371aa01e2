use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{CompletionGateway, GatewayError, LlmRequest, LlmResponse, TokenUsage};

/// Gateway double that replays a canned reply and records every request.
pub struct StubGateway {
    reply: Result<String, fn() -> GatewayError>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl StubGateway {
    pub fn replying(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: fn() -> GatewayError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().expect("stub lock").clone()
    }

    pub fn last_request(&self) -> LlmRequest {
        self.requests().pop().expect("no request recorded")
    }
}

#[async_trait]
impl CompletionGateway for StubGateway {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, GatewayError> {
        let model = request.model.clone();
        self.requests.lock().expect("stub lock").push(request);
        match &self.reply {
            Ok(text) => Ok(LlmResponse {
                text: text.clone(),
                token_usage: TokenUsage::default(),
                model,
            }),
            Err(make_error) => Err(make_error()),
        }
    }
}
