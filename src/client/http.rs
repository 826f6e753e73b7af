use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::CUSTOMER_HEADER;
use crate::client::gateway::{FetchError, ItemSearch, TrackingSource};
use crate::engine::locations::CourierLocationView;
use crate::models::courier::CourierLocationSample;
use crate::models::item::Item;
use crate::models::order::Order;

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Talks to the REST surface of this service.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    customer_id: Option<Uuid>,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| FetchError::Transport(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            customer_id: None,
        })
    }

    /// Sends requests on behalf of `customer_id`.
    pub fn with_customer(mut self, customer_id: Uuid) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self.client.get(&url).query(query);
        if let Some(customer_id) = self.customer_id {
            request = request.header(CUSTOMER_HEADER, customer_id.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            return Err(match status {
                StatusCode::NOT_FOUND => FetchError::NotFound(message),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    FetchError::Unauthorized(message)
                }
                _ => FetchError::Transport(format!("{status}: {message}")),
            });
        }

        response.json::<T>().await.map_err(|err| {
            if err.is_decode() {
                FetchError::InvalidResponse(err.to_string())
            } else {
                FetchError::Transport(err.to_string())
            }
        })
    }
}

#[async_trait]
impl TrackingSource for HttpGateway {
    async fn get_order(&self, order_id: Uuid) -> Result<Order, FetchError> {
        self.get(&format!("orders/{order_id}"), &[]).await
    }

    async fn get_courier_location(
        &self,
        order_id: Uuid,
        shop_order_id: Uuid,
    ) -> Result<Option<CourierLocationSample>, FetchError> {
        let view: CourierLocationView = self
            .get(
                &format!("orders/{order_id}/shop-orders/{shop_order_id}/courier-location"),
                &[],
            )
            .await?;
        Ok(view.location)
    }
}

#[async_trait]
impl ItemSearch for HttpGateway {
    async fn search_items(&self, city: &str, query: &str) -> Result<Vec<Item>, FetchError> {
        self.get("items/search", &[("city", city), ("query", query)])
            .await
    }
}
