use common::{Device, EMBEDDING_DIM, config::AppConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub model_path: String,
    pub device: Device,
    pub image_size: u32,
    pub vector_dim: usize,
    pub allow_pseudo_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: std::env::var("FLUKEPRINT_MODEL_PATH")
                .unwrap_or_else(|_| "models/flukeprint.onnx".to_string()),
            device: Device::Cpu,
            image_size: 224,
            vector_dim: EMBEDDING_DIM,
            allow_pseudo_fallback: pseudo_embed_allowed(),
        }
    }
}

impl EngineConfig {
    /// Engine settings for one worker. Device selection is an explicit
    /// parameter here; the engine constructor binds to it before the
    /// session is committed.
    pub fn from_app(cfg: &AppConfig, device: Device) -> Self {
        Self {
            model_path: cfg.model_path.clone(),
            device,
            image_size: cfg.image_size,
            vector_dim: cfg.embedding_dim,
            allow_pseudo_fallback: pseudo_embed_allowed(),
        }
    }
}

fn pseudo_embed_allowed() -> bool {
    std::env::var("FLUKEPRINT_ALLOW_PSEUDO_EMBED")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(cfg!(test))
}

#[cfg(test)]
mod tests {
    use common::Device;

    use super::EngineConfig;

    #[test]
    fn default_allows_pseudo_backend_under_test() {
        let cfg = EngineConfig::default();
        assert!(cfg.allow_pseudo_fallback);
        assert_eq!(cfg.device, Device::Cpu);
        assert_eq!(cfg.vector_dim, 128);
    }
}
