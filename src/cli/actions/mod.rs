pub mod server;

#[derive(Debug, Clone)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        session_ttl_seconds: u64,
    },
}
