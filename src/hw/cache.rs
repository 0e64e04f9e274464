use std::collections::HashMap;

use tracing::{debug, trace};
use uuid::Uuid;

use super::hardware::BoardLink;
use super::model::{CharacteristicHandle, ServiceHandle};
use crate::error::InteractionError;
use crate::protocol::{AttributeAddress, ServiceId, attribute_for_address};
use crate::utils::format_hex;

/// Per-connection memo of resolved service and characteristic handles.
///
/// Only handles are cached, never values: every [`AttributeCache::read_characteristic`]
/// performs a fresh transport read. Handles die with the connection, so the
/// cache must be [reset](AttributeCache::reset) before each connection attempt.
#[derive(Debug, Default)]
pub struct AttributeCache {
    services: HashMap<Uuid, ServiceHandle>,
    characteristics: HashMap<AttributeAddress, CharacteristicHandle>,
}

impl AttributeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached service handle, resolving it through `link` on a miss.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the service cannot be resolved.
    pub async fn resolve_service(
        &mut self,
        link: &dyn BoardLink,
        service: Uuid,
    ) -> Result<ServiceHandle, InteractionError> {
        if let Some(handle) = self.services.get(&service) {
            return Ok(*handle);
        }

        let handle = link.resolve_service(service).await?;
        debug!(
            service = ServiceId::for_uuid(service).map_or("unknown", ServiceId::name),
            %service,
            generation = handle.generation(),
            "resolved service handle"
        );
        self.services.insert(service, handle);
        Ok(handle)
    }

    /// Reads a characteristic, resolving and caching its handles as needed.
    ///
    /// # Errors
    ///
    /// Returns the transport error from resolution or from the read itself.
    pub async fn read_characteristic(
        &mut self,
        link: &dyn BoardLink,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, InteractionError> {
        let address = AttributeAddress::new(service, characteristic);
        let handle = match self.characteristics.get(&address) {
            Some(handle) => *handle,
            None => {
                let service_handle = self.resolve_service(link, service).await?;
                let handle = link
                    .resolve_characteristic(&service_handle, characteristic)
                    .await?;
                self.characteristics.insert(address, handle);
                handle
            }
        };

        let payload = link.read(&handle).await?;
        trace!(
            attribute = attribute_for_address(address).map(|attribute| attribute.name()),
            %address,
            payload = %format_hex(&payload),
            "read characteristic"
        );
        Ok(payload)
    }

    /// Drops every cached handle.
    pub fn reset(&mut self) {
        self.services.clear();
        self.characteristics.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.characteristics.is_empty()
    }

    #[must_use]
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn characteristic_count(&self) -> usize {
        self.characteristics.len()
    }
}
