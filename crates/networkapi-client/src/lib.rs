//! GloboNetworkAPI Client
//!
//! A Rust client library for the parts of GloboNetworkAPI an ingress
//! controller needs: VIP requests, server pools, equipment and IPv4 address
//! management. Provides typed models for the v3 JSON API and the legacy XML
//! endpoint used to allocate VIP addresses.
//!
//! # Example
//!
//! ```no_run
//! use networkapi_client::{NetworkApiClient, NetworkApiClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = NetworkApiClient::new(
//!     "http://networkapi.example.com".to_string(),
//!     "user".to_string(),
//!     "secret".to_string(),
//! )?;
//!
//! // Look up a VIP request by name
//! let vip = client.get_vip("my-vip").await?;
//!
//! // Allocate the next free address of VIP environment 12
//! let ip = client.create_vip_ipv4("my-vip", 12).await?;
//! println!("{} -> {}", vip.name, ip.to_ipv4());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod networkapi_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::NetworkApiClient;
pub use common::HttpClient;
pub use error::NetworkApiError;
pub use models::*;
pub use networkapi_trait::NetworkApiClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{MockCalls, MockNetworkApiClient};
