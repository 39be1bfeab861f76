//! Endpoints with their own shared-capacity limits.
//!
//! Some Helix operations are limited per target resource on top of the per-credential budget.
//! Banning and unbanning a user both go through `/moderation/bans` and draw from one pool per
//! broadcaster, no matter which moderator's token issued the call.

use crate::rate_limit::Bandwidth;
use crate::request::ApiRequest;

/// A family of requests sharing one bucket per target resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointScope {
    /// `POST`/`DELETE /moderation/bans`, keyed by `broadcaster_id`.
    ModerationBans,
}

impl EndpointScope {
    pub const ALL: [EndpointScope; 1] = [EndpointScope::ModerationBans];

    /// Stable identifier used in keys, logs and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ModerationBans => "moderation_bans",
        }
    }

    /// Documented limit for this endpoint.
    pub fn default_bandwidth(&self) -> Bandwidth {
        match self {
            Self::ModerationBans => Bandwidth::MODERATION_BANS,
        }
    }

    fn path_suffix(&self) -> &'static str {
        match self {
            Self::ModerationBans => "/moderation/bans",
        }
    }

    fn resource_param(&self) -> &'static str {
        match self {
            Self::ModerationBans => "broadcaster_id",
        }
    }

    /// Whether `request` targets this endpoint, regardless of the resource parameter.
    pub fn matches_path(&self, request: &ApiRequest) -> bool {
        request.path().trim_end_matches('/').ends_with(self.path_suffix())
    }

    /// The resource id `request` is limited by, if it targets this endpoint.
    pub fn resource_of(&self, request: &ApiRequest) -> Option<String> {
        if !self.matches_path(request) {
            return None;
        }
        request.query_param(self.resource_param()).filter(|id| !id.is_empty())
    }

    /// First scope whose path `request` targets.
    pub fn for_request(request: &ApiRequest) -> Option<EndpointScope> {
        Self::ALL.into_iter().find(|scope| scope.matches_path(request))
    }
}
