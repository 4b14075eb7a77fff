use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "means-to-an-end")]
#[command(about = "Per-connection time-series store speaking a 9-byte binary protocol")]
#[command(version)]
pub struct Config {
    /// Host to listen on
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8888)]
    pub port: u16,

    /// Log specification, overridden by RUST_LOG when set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::parse_from(["means-to-an-end"]);
        assert_eq!(config.address(), "0.0.0.0:8888");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn host_and_port_flags() {
        let config =
            Config::parse_from(["means-to-an-end", "--host", "127.0.0.1", "-p", "4444"]);
        assert_eq!(config.address(), "127.0.0.1:4444");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let result = Config::try_parse_from(["means-to-an-end", "--port", "70000"]);
        assert!(result.is_err());
    }
}
