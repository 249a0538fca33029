//! Tile layer descriptions and the cache job request builder.

use crate::model::{Action, CacheIdentifier, CacheJobRequest};
use crate::ports::TileLayerCatalog;
use crate::tiles::TilePyramid;
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// A tile layer as far as cache jobs are concerned: the gridsets it is
/// published in, the tile formats it supports, and the parameter combinations
/// it already has caches for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileLayerInfo {
    pub name: String,
    pub formats: BTreeSet<String>,
    /// Gridset id to the tile coverage of the layer in that gridset.
    pub gridsets: BTreeMap<String, TilePyramid>,
    #[serde(default)]
    pub parameter_ids: BTreeSet<String>,
}

/// Builds the cache job requests for a layer.
///
/// One request is produced per gridset, format, and parameters id combination.
pub struct CacheJobRequestBuilder<'a> {
    catalog: &'a dyn TileLayerCatalog,
    action: Action,
    layer: Option<String>,
    gridset_id: Option<String>,
    formats: BTreeSet<String>,
    parameters: BTreeMap<String, String>,
    parameters_id: Option<String>,
    min_zoom: Option<u8>,
    max_zoom: Option<u8>,
}

impl<'a> CacheJobRequestBuilder<'a> {
    pub fn new(catalog: &'a dyn TileLayerCatalog) -> Self {
        Self {
            catalog,
            action: Action::Seed,
            layer: None,
            gridset_id: None,
            formats: BTreeSet::new(),
            parameters: BTreeMap::new(),
            parameters_id: None,
            min_zoom: None,
            max_zoom: None,
        }
    }

    pub fn action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn gridset_id(mut self, gridset_id: impl Into<String>) -> Self {
        self.gridset_id = Some(gridset_id.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.formats.insert(format.into());
        self
    }

    /// Targets the cache of a parameter combination. Replaces any
    /// [`parameters_id`](Self::parameters_id).
    pub fn parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self.parameters_id = None;
        self
    }

    /// Targets the cache of an already known parameters id. Replaces any
    /// [`parameters`](Self::parameters).
    pub fn parameters_id(mut self, parameters_id: impl Into<String>) -> Self {
        self.parameters_id = Some(parameters_id.into());
        self.parameters.clear();
        self
    }

    pub fn min_zoom(mut self, zoom: u8) -> Self {
        self.min_zoom = Some(zoom);
        self
    }

    pub fn max_zoom(mut self, zoom: u8) -> Self {
        self.max_zoom = Some(zoom);
        self
    }

    pub fn build(self) -> Result<Vec<CacheJobRequest>> {
        let layer_name = self
            .layer
            .as_deref()
            .ok_or_else(|| Error::InvalidRequest("layer name is required".to_string()))?;
        let layer = self.catalog.layer(layer_name).ok_or_else(|| {
            Error::InvalidRequest(format!("layer '{}' couldn't be resolved", layer_name))
        })?;

        if let (Some(min), Some(max)) = (self.min_zoom, self.max_zoom) {
            if min > max {
                return Err(Error::InvalidRequest(format!(
                    "min zoom {} is greater than max zoom {}",
                    min, max
                )));
            }
        }

        let gridsets = self.resolve_gridsets(&layer)?;
        let formats = self.resolve_formats(&layer)?;
        let parameter_ids = self.resolve_parameter_ids(&layer);
        let timestamp = Utc::now();

        let mut requests = Vec::new();
        for (gridset_id, coverage) in gridsets {
            let tiles = coverage.subset(self.min_zoom, self.max_zoom);
            if tiles.is_empty() {
                return Err(Error::InvalidRequest(format!(
                    "gridset {} of layer {} has no zoom levels in the requested range",
                    gridset_id, layer.name
                )));
            }
            for format in &formats {
                for parameters_id in &parameter_ids {
                    let cache = CacheIdentifier::new(&layer.name, gridset_id, format)
                        .with_parameters_id(parameters_id.clone());
                    requests.push(CacheJobRequest {
                        action: self.action,
                        cache,
                        tiles: tiles.clone(),
                        timestamp,
                    });
                }
            }
        }
        Ok(requests)
    }

    fn resolve_gridsets<'l>(&self, layer: &'l TileLayerInfo) -> Result<Vec<(&'l str, &'l TilePyramid)>> {
        match &self.gridset_id {
            Some(requested) => layer
                .gridsets
                .get_key_value(requested)
                .map(|(id, coverage)| vec![(id.as_str(), coverage)])
                .ok_or_else(|| {
                    Error::InvalidRequest(format!(
                        "layer {} is not configured for gridset {}",
                        layer.name, requested
                    ))
                }),
            None => Ok(layer
                .gridsets
                .iter()
                .map(|(id, coverage)| (id.as_str(), coverage))
                .collect()),
        }
    }

    fn resolve_formats(&self, layer: &TileLayerInfo) -> Result<Vec<String>> {
        if self.formats.is_empty() {
            return Ok(layer.formats.iter().cloned().collect());
        }
        let unsupported: Vec<&str> = self
            .formats
            .difference(&layer.formats)
            .map(String::as_str)
            .collect();
        if !unsupported.is_empty() {
            return Err(Error::InvalidRequest(format!(
                "the following formats are not supported by layer {}: {}",
                layer.name,
                unsupported.join(", ")
            )));
        }
        Ok(self.formats.iter().cloned().collect())
    }

    fn resolve_parameter_ids(&self, layer: &TileLayerInfo) -> Vec<Option<String>> {
        if !self.parameters.is_empty() {
            return vec![Some(parameters_id(&self.parameters))];
        }
        if let Some(id) = &self.parameters_id {
            return vec![Some(id.clone())];
        }
        // the default cache plus every parameter combination already cached
        std::iter::once(None)
            .chain(layer.parameter_ids.iter().cloned().map(Some))
            .collect()
    }
}

/// Stable id of a parameter combination: hex SHA-256 of the `key=value` pairs
/// sorted by key and joined with `&`.
pub fn parameters_id(parameters: &BTreeMap<String, String>) -> String {
    let canonical = parameters
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
