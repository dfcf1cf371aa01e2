use std::{collections::BTreeSet, sync::Arc};

use anyhow::{Context, Result};
use tracing::warn;

use crate::{
    config::Settings,
    llm::{LlmClient, SharedGateway},
};

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    llm: SharedGateway,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self> {
        let llm_client =
            LlmClient::from_env(settings.llm_timeout).context("failed to initialize LLM client")?;

        let models: BTreeSet<&str> = [
            &settings.models.feedback_model,
            &settings.models.detection_model,
            &settings.models.chat_model,
            &settings.models.title_model,
            &settings.models.analysis_model,
        ]
        .into_iter()
        .map(String::as_str)
        .collect();

        for model in models {
            if !llm_client.has_credential_for(model) {
                warn!(%model, "no API credential configured for model; requests will fail");
            }
        }

        Ok(Self::with_gateway(settings, Arc::new(llm_client)))
    }

    /// Builds state around an explicit gateway, e.g. a test double.
    pub fn with_gateway(settings: Settings, llm: SharedGateway) -> Self {
        Self {
            settings: Arc::new(settings),
            llm,
        }
    }

    pub fn llm_client(&self) -> SharedGateway {
        self.llm.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
