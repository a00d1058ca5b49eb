//! Keyed capture and enrichment stores.

use std::collections::BTreeMap;

use crate::types::Listing;

/// What happened to a listing offered to the captured store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Inserted,
    Duplicate,
}

/// Scan-phase and enrich-phase results, keyed by external id.
#[derive(Debug, Default)]
pub struct CaptureStore {
    captured: BTreeMap<String, Listing>,
    enriched: BTreeMap<String, Listing>,
}

impl CaptureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a scan-phase listing. First seen wins.
    pub fn capture(&mut self, listing: Listing) -> CaptureOutcome {
        if self.captured.contains_key(&listing.external_id) {
            return CaptureOutcome::Duplicate;
        }
        self.captured.insert(listing.external_id.clone(), listing);
        CaptureOutcome::Inserted
    }

    /// Merge a detail-page listing over what is already known.
    ///
    /// Fields present on the detail record overwrite; the image list is
    /// replaced only by a strictly longer one, so image count never drops.
    /// Returns the merged record.
    pub fn enrich(&mut self, detail: Listing) -> &Listing {
        let id = detail.external_id.clone();
        let base = self
            .enriched
            .get(&id)
            .or_else(|| self.captured.get(&id))
            .cloned();

        let merged = match base {
            Some(base) => merge(base, detail),
            None => Listing {
                is_enriched: true,
                ..detail
            },
        };
        self.enriched.insert(id.clone(), merged);
        &self.enriched[&id]
    }

    /// Enriched record if present, else the captured one.
    pub fn resolved(&self, id: &str) -> Option<&Listing> {
        self.enriched.get(id).or_else(|| self.captured.get(id))
    }

    pub fn captured_ids(&self) -> Vec<String> {
        self.captured.keys().cloned().collect()
    }

    pub fn get_captured(&self, id: &str) -> Option<&Listing> {
        self.captured.get(id)
    }

    pub fn get_enriched(&self, id: &str) -> Option<&Listing> {
        self.enriched.get(id)
    }

    /// Authoritative "found" count.
    pub fn captured_count(&self) -> usize {
        self.captured.len()
    }

    pub fn enriched_count(&self) -> usize {
        self.enriched.len()
    }

    pub fn clear(&mut self) {
        self.captured.clear();
        self.enriched.clear();
    }
}

fn merge(base: Listing, detail: Listing) -> Listing {
    let images = if detail.images.len() > base.images.len() {
        detail.images
    } else {
        base.images
    };
    Listing {
        external_id: base.external_id,
        title: detail.title.or(base.title),
        price: detail.price.or(base.price),
        description: detail.description.or(base.description),
        condition: detail.condition.or(base.condition),
        category: detail.category.or(base.category),
        location: detail.location.or(base.location),
        images,
        url: if detail.url.is_empty() { base.url } else { detail.url },
        status: detail.status,
        is_enriched: true,
        captured_at: base.captured_at,
    }
}
