use config_loader::{OracleSettings, SecretProvider};
use tracing::info;

use crate::{GenerationOracle, GoogleOracle, OpenAiOracle, OracleError, Vendor};

/// Builds a vendor session from settings, resolving its API key through a
/// [`SecretProvider`].
pub struct OracleFactory;

impl OracleFactory {
    pub fn create(
        vendor: Vendor,
        settings: &OracleSettings,
        secrets: &dyn SecretProvider,
        debug: bool,
    ) -> Result<Box<dyn GenerationOracle>, OracleError> {
        let api_key = secrets
            .resolve(vendor.secret_scope(), "api_key")
            .map_err(|e| OracleError::MissingCredential {
                vendor,
                message: e.to_string(),
            })?;

        let oracle: Box<dyn GenerationOracle> = match vendor {
            Vendor::OpenAi => {
                info!(%vendor, model = %settings.openai_model, "oracle.create");
                Box::new(OpenAiOracle::new(settings, api_key, debug)?)
            }
            Vendor::Google => {
                info!(%vendor, model = %settings.google_model, "oracle.create");
                Box::new(GoogleOracle::new(settings, api_key, debug)?)
            }
        };
        Ok(oracle)
    }

    /// Convenience for callers holding a raw model selector.
    pub fn create_for_model(
        model: &str,
        settings: &OracleSettings,
        secrets: &dyn SecretProvider,
        debug: bool,
    ) -> Result<Box<dyn GenerationOracle>, OracleError> {
        Self::create(Vendor::from_model_name(model)?, settings, secrets, debug)
    }
}
