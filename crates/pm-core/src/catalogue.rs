//! Read-only view of the card inventory.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Item;
use crate::store::{bounded, StoreSettings};
use crate::traits::ItemRepo;

pub struct Catalogue {
    items: Arc<dyn ItemRepo>,
    settings: StoreSettings,
}

impl Catalogue {
    pub fn new(items: Arc<dyn ItemRepo>, settings: StoreSettings) -> Self {
        Self { items, settings }
    }

    pub async fn list_items(&self) -> Result<Vec<Item>> {
        bounded(self.settings.timeout, "list items", self.items.list_items()).await
    }

    pub async fn get_item(&self, id: Uuid) -> Result<Item> {
        bounded(self.settings.timeout, "load item", self.items.get_item(id))
            .await?
            .ok_or_else(|| AppError::not_found("Pokemon", id))
    }
}
