//! HTTP transport backed by `reqwest`.
//!
//! Objects live directly under the endpoint's base URL; PUT uploads them and
//! GET streams them back. Address-cache warming resolves the endpoint's
//! authority repeatedly and keeps every distinct address, mirroring what a
//! load-balanced endpoint returns across lookups.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Client, Url};

use canary_core::TransportError;
use canary_core::transport::{ByteStream, Transport};

/// [`Transport`] over plain HTTP.
#[derive(Debug)]
pub struct HttpTransport {
    base: Url,
    authority: String,
    addresses: Mutex<Vec<String>>,
    client: Mutex<Client>,
    connect_timeout: Duration,
    max_connections: usize,
}

impl HttpTransport {
    /// Creates a transport for the given endpoint URL.
    pub fn new(
        endpoint: &str,
        connect_timeout: Duration,
        max_connections: usize,
    ) -> Result<Self, TransportError> {
        let base: Url = endpoint.parse().map_err(TransportError::client)?;
        let host = base
            .host_str()
            .ok_or_else(|| TransportError::Resolution(endpoint.to_owned()))?;
        let port = base.port_or_known_default().unwrap_or(80);
        let authority = format!("{host}:{port}");

        let client = build_client(connect_timeout, max_connections)?;

        Ok(Self {
            base,
            authority,
            addresses: Mutex::default(),
            client: Mutex::new(client),
            connect_timeout,
            max_connections,
        })
    }

    fn url_for(&self, key: &str) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::Resolution(self.base.to_string()))?
            .push(key);
        Ok(url)
    }

    fn client(&self) -> Client {
        self.client.lock().unwrap().clone()
    }
}

fn build_client(
    connect_timeout: Duration,
    max_connections: usize,
) -> Result<Client, TransportError> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(max_connections)
        .build()
        .map_err(TransportError::client)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn warm_address_cache(&self, concurrency: u32) -> Result<(), TransportError> {
        for _ in 0..concurrency {
            let resolved = tokio::net::lookup_host(&self.authority).await?;

            let mut addresses = self.addresses.lock().unwrap();
            for addr in resolved {
                let addr = addr.to_string();
                if !addresses.contains(&addr) {
                    addresses.push(addr);
                }
            }
        }

        tracing::info!(
            endpoint = self.authority,
            addresses = self.resolved_address_count(),
            "address cache warmed"
        );
        Ok(())
    }

    async fn spawn_connection_pools(&self) -> Result<(), TransportError> {
        let client = build_client(self.connect_timeout, self.max_connections)?;
        *self.client.lock().unwrap() = client;
        Ok(())
    }

    async fn endpoint_for_transfer(&self, index: u32) -> Result<String, TransportError> {
        let addresses = self.addresses.lock().unwrap();
        if addresses.is_empty() {
            return Err(TransportError::Resolution(self.authority.clone()));
        }
        Ok(addresses[index as usize % addresses.len()].clone())
    }

    async fn seed_address_cache(&self, address: String) -> Result<(), TransportError> {
        self.addresses.lock().unwrap().push(address);
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        size_hint: u64,
        body: ByteStream,
    ) -> Result<(), TransportError> {
        let url = self.url_for(key)?;
        let response = self
            .client()
            .put(url)
            .header(reqwest::header::CONTENT_LENGTH, size_hint)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(TransportError::client)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::BadStatus(status.as_u16()));
        }
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<ByteStream, TransportError> {
        let url = self.url_for(key)?;
        let response = self
            .client()
            .get(url)
            .send()
            .await
            .map_err(TransportError::client)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::BadStatus(status.as_u16()));
        }

        Ok(response
            .bytes_stream()
            .map_err(TransportError::client)
            .boxed())
    }

    fn endpoint(&self) -> String {
        self.base.to_string()
    }

    fn resolved_address_count(&self) -> usize {
        self.addresses.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(endpoint: &str) -> HttpTransport {
        HttpTransport::new(endpoint, Duration::from_secs(3), 16).unwrap()
    }

    #[test]
    fn keys_append_to_the_base_path() {
        let transport = transport("http://storage.example:9000/bucket");
        let url = transport.url_for("canary-obj-42").unwrap();
        assert_eq!(url.as_str(), "http://storage.example:9000/bucket/canary-obj-42");
    }

    #[test]
    fn authority_falls_back_to_default_port() {
        let transport = transport("https://storage.example/bucket");
        assert_eq!(transport.authority, "storage.example:443");
    }

    #[tokio::test]
    async fn seeded_addresses_are_visible() {
        let transport = transport("http://storage.example:9000");
        assert_eq!(transport.resolved_address_count(), 0);

        transport
            .seed_address_cache("10.0.0.5:443".into())
            .await
            .unwrap();
        transport
            .seed_address_cache("10.0.0.6:443".into())
            .await
            .unwrap();

        assert_eq!(transport.resolved_address_count(), 2);
        assert_eq!(transport.endpoint_for_transfer(0).await.unwrap(), "10.0.0.5:443");
        assert_eq!(transport.endpoint_for_transfer(3).await.unwrap(), "10.0.0.6:443");
    }

    #[tokio::test]
    async fn empty_address_pool_is_an_error() {
        let transport = transport("http://storage.example:9000");
        assert!(matches!(
            transport.endpoint_for_transfer(0).await,
            Err(TransportError::Resolution(_))
        ));
    }
}
