//! Capability predicates and number-format resolution supplied by the host.
//!
//! The control only asks these questions; it never answers them itself.
//! [`HassPredicates`] and [`HassFormats`] mirror the Home Assistant frontend
//! helpers and are used unless the builder is given something else.

use crate::types::{
    parse_number, EntityMetadata, EntitySnapshot, FormatOptions, STATE_OFF, STATE_UNAVAILABLE,
    STATE_UNKNOWN,
};

pub trait EntityPredicates: Send + Sync {
    fn is_available(&self, entity: &EntitySnapshot) -> bool;
    fn is_active(&self, entity: &EntitySnapshot) -> bool;
}

pub trait FormatResolver: Send + Sync {
    /// Entity-specific options, or `None` when nothing is known about the entity.
    fn number_format_options(
        &self,
        entity: &EntitySnapshot,
        metadata: Option<&EntityMetadata>,
    ) -> Option<FormatOptions>;

    /// Options derived from the raw state string alone.
    fn default_format_options(&self, state: &str) -> FormatOptions;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HassPredicates;

impl EntityPredicates for HassPredicates {
    fn is_available(&self, entity: &EntitySnapshot) -> bool {
        entity.state != STATE_UNAVAILABLE
    }

    fn is_active(&self, entity: &EntitySnapshot) -> bool {
        !matches!(
            entity.state.as_str(),
            STATE_UNAVAILABLE | STATE_UNKNOWN | STATE_OFF
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HassFormats;

impl FormatResolver for HassFormats {
    fn number_format_options(
        &self,
        entity: &EntitySnapshot,
        metadata: Option<&EntityMetadata>,
    ) -> Option<FormatOptions> {
        if let Some(precision) = metadata.and_then(|m| m.display_precision) {
            return Some(FormatOptions::fraction_digits(precision, precision));
        }

        let integer_step = entity.step().is_some_and(|s| s.fract() == 0.0);
        let integer_state = parse_number(&entity.state).is_some_and(|v| v.fract() == 0.0);
        if integer_step && integer_state {
            return Some(FormatOptions {
                minimum_fraction_digits: None,
                maximum_fraction_digits: Some(0),
            });
        }
        None
    }

    fn default_format_options(&self, state: &str) -> FormatOptions {
        let digits = state
            .split_once('.')
            .map(|(_, frac)| frac.len() as u32)
            .unwrap_or(0);
        FormatOptions::fraction_digits(digits, digits)
    }
}
