use super::RequestsLoggingLevel;

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Origin allowed by CORS (the frontend dev server).
    pub cors_origin: String,
    pub requests_logging_level: RequestsLoggingLevel,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 4001,
            cors_origin: "http://localhost:4000".to_string(),
            requests_logging_level: RequestsLoggingLevel::Path,
        }
    }
}
