pub mod stock;
pub mod ticket;

pub use stock::{StockMessageHandler, StockOperation};

pub async fn health_check() -> &'static str {
    "OK"
}
