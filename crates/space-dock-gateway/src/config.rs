pub const DEFAULT_HOST: &str = "0.0.0.0";
// 8080 is taken by the environments' published port
pub const DEFAULT_PORT: u16 = 5000;

/// Listener settings for the HTTP gateway.
#[derive(clap::Args, Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "SPACE_DOCK_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(long, short, env = "SPACE_DOCK_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
