use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes HTTP requests; station sources are generic over it.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
