//! Data-driven registry of account tiers and thumbnail specs.
//!
//! Tiers are rows, not an enum: operators can add tiers and thumbnail heights
//! at runtime. The three built-in tiers are seeded once and are read-only
//! afterwards.
//!
//! # Layout
//!
//! ```text
//! tiers      name -> AccountTier
//! specs      height -> ThumbnailSpec
//! links      {(tier, height)}          many-to-many join
//! bindings   user -> tier              at most one tier per user
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::TierError;
use crate::thumbnail::MaxHeightCache;

/// Name of the built-in entry-level tier.
pub const BASIC_TIER: &str = "basic";

/// Name of the built-in tier that can see originals.
pub const PREMIUM_TIER: &str = "premium";

/// Name of the built-in tier that can also mint expiring links.
pub const ENTERPRISE_TIER: &str = "enterprise";

/// Thumbnail heights seeded with the built-in tiers.
pub const BUILTIN_HEIGHTS: [u32; 2] = [200, 400];

// =============================================================================
// Types
// =============================================================================

/// Identity of an authenticated user, as handed over by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named capability bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountTier {
    name: String,

    /// Presence of the link to the originally uploaded file
    pub allow_original_access: bool,

    /// Ability to generate expiring links
    pub allow_expiring_links: bool,

    is_builtin: bool,
}

impl AccountTier {
    /// Create a custom tier with no capabilities.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allow_original_access: false,
            allow_expiring_links: false,
            is_builtin: false,
        }
    }

    pub fn with_original_access(mut self, allow: bool) -> Self {
        self.allow_original_access = allow;
        self
    }

    pub fn with_expiring_links(mut self, allow: bool) -> Self {
        self.allow_expiring_links = allow;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_builtin(&self) -> bool {
        self.is_builtin
    }

    fn builtin(name: &str, original: bool, expiring: bool) -> Self {
        Self {
            name: name.to_string(),
            allow_original_access: original,
            allow_expiring_links: expiring,
            is_builtin: true,
        }
    }
}

/// A configured target thumbnail height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThumbnailSpec {
    pub height: u32,
    pub is_builtin: bool,
}

/// Resolved capabilities of a tier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    pub can_see_original: bool,
    pub can_see_expiring: bool,
    pub allowed_heights: BTreeSet<u32>,
}

#[derive(Default)]
struct CatalogState {
    tiers: HashMap<String, AccountTier>,
    specs: BTreeMap<u32, ThumbnailSpec>,
    links: BTreeSet<(String, u32)>,
    bindings: HashMap<UserId, String>,
}

impl CatalogState {
    fn capabilities_of(&self, tier_name: &str) -> Result<Capabilities, TierError> {
        let tier = self
            .tiers
            .get(tier_name)
            .ok_or_else(|| TierError::UnknownTier(tier_name.to_string()))?;

        let allowed_heights = self
            .links
            .iter()
            .filter(|(name, _)| name == tier_name)
            .map(|(_, height)| *height)
            .collect();

        Ok(Capabilities {
            can_see_original: tier.allow_original_access,
            can_see_expiring: tier.allow_expiring_links,
            allowed_heights,
        })
    }

    fn mutable_tier(&self, name: &str) -> Result<&AccountTier, TierError> {
        let tier = self
            .tiers
            .get(name)
            .ok_or_else(|| TierError::UnknownTier(name.to_string()))?;
        if tier.is_builtin {
            return Err(TierError::BuiltinImmutable(format!("tier '{}'", name)));
        }
        Ok(tier)
    }
}

// =============================================================================
// TierCatalog
// =============================================================================

/// Registry mapping tiers to capabilities and users to tiers.
pub struct TierCatalog {
    state: RwLock<CatalogState>,

    /// Invalidated whenever the set of thumbnail specs changes
    height_cache: Option<Arc<MaxHeightCache>>,
}

impl TierCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
            height_cache: None,
        }
    }

    /// Create an empty catalog that invalidates `cache` on spec changes.
    pub fn with_height_cache(cache: Arc<MaxHeightCache>) -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
            height_cache: Some(cache),
        }
    }

    /// Insert the built-in tiers and thumbnail specs that are not present yet.
    ///
    /// | tier       | original | expiring | heights  |
    /// |------------|----------|----------|----------|
    /// | basic      | no       | no       | 200      |
    /// | premium    | yes      | no       | 200, 400 |
    /// | enterprise | yes      | yes      | 200, 400 |
    pub async fn seed_builtin(&self) {
        let mut state = self.state.write().await;

        for height in BUILTIN_HEIGHTS {
            state.specs.entry(height).or_insert(ThumbnailSpec {
                height,
                is_builtin: true,
            });
        }

        let seeds: [(&str, bool, bool, &[u32]); 3] = [
            (BASIC_TIER, false, false, &[200]),
            (PREMIUM_TIER, true, false, &[200, 400]),
            (ENTERPRISE_TIER, true, true, &[200, 400]),
        ];

        for (name, original, expiring, heights) in seeds {
            if state.tiers.contains_key(name) {
                continue;
            }
            state
                .tiers
                .insert(name.to_string(), AccountTier::builtin(name, original, expiring));
            for height in heights {
                state.links.insert((name.to_string(), *height));
            }
            info!(tier = name, "Seeded built-in account tier");
        }

        drop(state);
        self.invalidate_height_cache().await;
    }

    /// Resolve the capabilities of a tier.
    pub async fn capabilities_of(&self, tier: &str) -> Result<Capabilities, TierError> {
        self.state.read().await.capabilities_of(tier)
    }

    /// Resolve the capabilities of the tier a user is bound to.
    ///
    /// Returns `Ok(None)` for a user without a binding. A binding that names a
    /// tier missing from the catalog is an invariant violation and surfaces as
    /// [`TierError::UnknownTier`].
    pub async fn capabilities_for_user(
        &self,
        user: &UserId,
    ) -> Result<Option<Capabilities>, TierError> {
        let state = self.state.read().await;
        match state.bindings.get(user) {
            Some(tier) => state.capabilities_of(tier).map(Some),
            None => Ok(None),
        }
    }

    /// Get a tier by name.
    pub async fn tier(&self, name: &str) -> Option<AccountTier> {
        self.state.read().await.tiers.get(name).cloned()
    }

    /// All tiers, ordered by name.
    pub async fn tiers(&self) -> Vec<AccountTier> {
        let state = self.state.read().await;
        let mut tiers: Vec<_> = state.tiers.values().cloned().collect();
        tiers.sort_by(|a, b| a.name.cmp(&b.name));
        tiers
    }

    /// Add a custom tier.
    pub async fn add_tier(&self, tier: AccountTier) -> Result<(), TierError> {
        let mut state = self.state.write().await;
        if state.tiers.contains_key(&tier.name) {
            return Err(TierError::DuplicateTier(tier.name));
        }
        debug!(tier = %tier.name, "Adding account tier");
        let tier = AccountTier {
            is_builtin: false,
            ..tier
        };
        state.tiers.insert(tier.name.clone(), tier);
        Ok(())
    }

    /// Replace the capability flags of a custom tier.
    pub async fn update_tier(&self, tier: AccountTier) -> Result<(), TierError> {
        let mut state = self.state.write().await;
        state.mutable_tier(&tier.name)?;
        let tier = AccountTier {
            is_builtin: false,
            ..tier
        };
        state.tiers.insert(tier.name.clone(), tier);
        Ok(())
    }

    /// Remove a custom tier together with its join rows and user bindings.
    pub async fn remove_tier(&self, name: &str) -> Result<(), TierError> {
        let mut state = self.state.write().await;
        state.mutable_tier(name)?;
        state.tiers.remove(name);
        state.links.retain(|(tier, _)| tier != name);
        state.bindings.retain(|_, tier| tier != name);
        info!(tier = name, "Removed account tier");
        drop(state);
        self.invalidate_height_cache().await;
        Ok(())
    }

    /// Configure a new thumbnail height, linked to no tier yet.
    pub async fn add_thumbnail_spec(&self, height: u32) -> Result<ThumbnailSpec, TierError> {
        let mut state = self.state.write().await;
        if state.specs.contains_key(&height) {
            return Err(TierError::DuplicateHeight(height));
        }
        let spec = ThumbnailSpec {
            height,
            is_builtin: false,
        };
        state.specs.insert(height, spec);
        drop(state);
        self.invalidate_height_cache().await;
        Ok(spec)
    }

    /// Remove a custom thumbnail height and unlink it from every tier.
    pub async fn remove_thumbnail_spec(&self, height: u32) -> Result<(), TierError> {
        let mut state = self.state.write().await;
        let spec = state
            .specs
            .get(&height)
            .ok_or(TierError::UnknownHeight(height))?;
        if spec.is_builtin {
            return Err(TierError::BuiltinImmutable(format!(
                "thumbnail height {} px",
                height
            )));
        }
        state.specs.remove(&height);
        state.links.retain(|(_, h)| *h != height);
        drop(state);
        self.invalidate_height_cache().await;
        Ok(())
    }

    /// Allow a custom tier to see thumbnails of `height`.
    pub async fn link(&self, tier: &str, height: u32) -> Result<(), TierError> {
        let mut state = self.state.write().await;
        state.mutable_tier(tier)?;
        if !state.specs.contains_key(&height) {
            return Err(TierError::UnknownHeight(height));
        }
        state.links.insert((tier.to_string(), height));
        drop(state);
        self.invalidate_height_cache().await;
        Ok(())
    }

    /// Withdraw a thumbnail height from a custom tier.
    pub async fn unlink(&self, tier: &str, height: u32) -> Result<(), TierError> {
        let mut state = self.state.write().await;
        state.mutable_tier(tier)?;
        state.links.remove(&(tier.to_string(), height));
        drop(state);
        self.invalidate_height_cache().await;
        Ok(())
    }

    /// Bind a user to a tier, replacing any previous binding.
    ///
    /// Returns the previously bound tier, if any.
    pub async fn bind_user(&self, user: UserId, tier: &str) -> Result<Option<String>, TierError> {
        let mut state = self.state.write().await;
        if !state.tiers.contains_key(tier) {
            return Err(TierError::UnknownTier(tier.to_string()));
        }
        debug!(user = %user, tier, "Binding user to account tier");
        Ok(state.bindings.insert(user, tier.to_string()))
    }

    /// Remove a user's binding, leaving the user without capabilities.
    pub async fn unbind_user(&self, user: &UserId) -> Option<String> {
        self.state.write().await.bindings.remove(user)
    }

    /// Name of the tier a user is bound to.
    pub async fn tier_of(&self, user: &UserId) -> Option<String> {
        self.state.read().await.bindings.get(user).cloned()
    }

    /// All configured thumbnail specs, ordered by height.
    pub async fn thumbnail_specs(&self) -> Vec<ThumbnailSpec> {
        self.state.read().await.specs.values().copied().collect()
    }

    /// Largest configured thumbnail height, computed from the current specs.
    pub async fn max_thumbnail_height(&self) -> Option<u32> {
        self.state.read().await.specs.keys().next_back().copied()
    }

    async fn invalidate_height_cache(&self) {
        if let Some(cache) = &self.height_cache {
            cache.invalidate().await;
        }
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
