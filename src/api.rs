//! Remote status API integration
//!
//! The monitoring backend is consumed through the narrow [`StatusApi`] seam
//! so the polling session can be driven against test doubles. The production
//! implementation is an authenticated HTTPS client in [`client`].

pub mod client;
pub mod types;

pub use client::HttpStatusApi;
pub use types::{InverterProfile, PvSystemMetadata, SystemStatusDetails};

use crate::error::Result;

/// Read access to the remote monitoring backend
#[async_trait::async_trait]
pub trait StatusApi: Send + Sync {
    /// One page of PV systems the authenticated user may access
    async fn get_pv_systems(&self, offset: usize, limit: usize)
    -> Result<Vec<PvSystemMetadata>>;

    /// Current status details for one system
    async fn get_system_status_details(&self, system_id: &str) -> Result<SystemStatusDetails>;

    /// Profile of one inverter (display name and friends)
    async fn get_inverter_profile(&self, inverter_id: &str) -> Result<InverterProfile>;
}

/// Enumerate every accessible system, paging until a short page comes back
pub async fn fetch_all_systems(
    api: &dyn StatusApi,
    page_size: usize,
) -> Result<Vec<PvSystemMetadata>> {
    let mut systems = Vec::new();
    let mut offset = 0;
    loop {
        let page = api.get_pv_systems(offset, page_size).await?;
        let got = page.len();
        systems.extend(page);
        if got < page_size {
            break;
        }
        offset += page_size;
    }
    Ok(systems)
}
