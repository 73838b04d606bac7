//! Outline configuration: built-in defaults, the optional in-page marker
//! element, then command-line overrides. Every numeric value is clamped and
//! anything malformed silently keeps the previous layer's value.

use std::time::Duration;

use clap::ValueEnum;

use crate::media::{MediaQuery, Viewport};
use crate::page::Element;

pub const DEFAULT_MOBILE_MEDIA_QUERY: &str =
    "(orientation: portrait) and (pointer: coarse) and (max-width: 768px)";

/// Space kept free below a locked popup.
pub const POPUP_BOTTOM_INSET: f64 = 12.0;

/// Fraction of the viewport below the scroll top used by [`ActiveAnchor::Center`].
/// Not configurable, unlike the offset used by [`ActiveAnchor::Top`].
pub const CENTER_ANCHOR_BIAS: f64 = 0.35;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ActiveAnchor {
    /// Focus line at `scroll_offset` below the scroll top.
    #[default]
    Top,
    /// Focus line at 35% of the viewport height below the scroll top.
    Center,
}

impl ActiveAnchor {
    fn from_attr(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("center") {
            Self::Center
        } else {
            Self::Top
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum PopupMode {
    /// Decided by the media query.
    #[default]
    Auto,
    On,
    Off,
}

impl PopupMode {
    fn from_attr(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Self::On,
            "0" | "false" | "no" | "off" => Self::Off,
            _ => Self::Auto,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timings {
    pub show: Duration,
    pub hide: Duration,
    pub focus_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            show: Duration::from_millis(50),
            hide: Duration::from_millis(180),
            focus_delay: Duration::from_millis(350),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SettleTuning {
    /// Distance to the target that counts as arrived.
    pub settle_distance: f64,
    /// Quiet period after the last meaningful sample.
    pub settle: Duration,
    /// Minimum spacing between processed scroll samples.
    pub tick: Duration,
    /// Hard limit for one session.
    pub timeout: Duration,
}

impl Default for SettleTuning {
    fn default() -> Self {
        Self {
            settle_distance: 2.0,
            settle: Duration::from_millis(60),
            tick: Duration::from_millis(30),
            timeout: Duration::from_millis(2000),
        }
    }
}

/// Answers media queries for the current environment.
pub trait MediaProbe {
    fn matches_media(&self, query: &str) -> bool;
}

impl MediaProbe for Viewport {
    fn matches_media(&self, query: &str) -> bool {
        match MediaQuery::parse(query) {
            Ok(parsed) => parsed.matches(self),
            Err(err) => {
                tracing::warn!(query, error = %err, "ignoring malformed media query");
                false
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutlineConfig {
    pub max_level: u8,
    pub min_items: usize,
    pub scroll_offset: f64,
    pub sticky_top: f64,
    pub dynamic_title_offset: f64,
    pub active_anchor: ActiveAnchor,
    pub default_title: String,
    pub mobile_media_query: String,
    /// Fullscreen popup presentation; disables position locking.
    pub mobile_popup: bool,
    pub timings: Timings,
    pub settle: SettleTuning,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            max_level: 3,
            min_items: 3,
            scroll_offset: 96.0,
            sticky_top: 151.0,
            dynamic_title_offset: 18.0,
            active_anchor: ActiveAnchor::Top,
            default_title: "Untitled".to_string(),
            mobile_media_query: DEFAULT_MOBILE_MEDIA_QUERY.to_string(),
            mobile_popup: false,
            timings: Timings::default(),
            settle: SettleTuning::default(),
        }
    }
}

/// Values supplied on the command line; they win over the marker element.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigOverrides {
    pub max_level: Option<i64>,
    pub min_items: Option<i64>,
    pub scroll_offset: Option<i64>,
    pub sticky_top: Option<i64>,
    pub title_offset: Option<i64>,
    pub default_title: Option<String>,
    pub active_anchor: Option<ActiveAnchor>,
    pub mobile_popup: Option<PopupMode>,
    pub mobile_media_query: Option<String>,
}

impl OutlineConfig {
    pub fn resolve(
        marker: Option<&Element>,
        overrides: &ConfigOverrides,
        probe: &dyn MediaProbe,
    ) -> Self {
        let mut cfg = Self::default();
        let mut popup_mode = PopupMode::Auto;

        if let Some(el) = marker {
            cfg.max_level = clamp_attr(el, "data-max-level", 1, 3, cfg.max_level.into()) as u8;
            cfg.min_items = clamp_attr(el, "data-min-items", 1, 100, cfg.min_items as i64) as usize;
            cfg.scroll_offset =
                clamp_attr(el, "data-scroll-offset", 0, 1000, cfg.scroll_offset as i64) as f64;
            cfg.sticky_top = clamp_attr(el, "data-sticky-top", 0, 5000, cfg.sticky_top as i64) as f64;
            cfg.dynamic_title_offset = clamp_attr(
                el,
                "data-title-offset",
                0,
                1000,
                cfg.dynamic_title_offset as i64,
            ) as f64;
            if let Some(title) = el.attr("data-default-title").filter(|t| !t.is_empty()) {
                cfg.default_title = title.to_string();
            }
            if let Some(query) = el.attr("data-mobile-media-query").filter(|q| !q.is_empty()) {
                cfg.mobile_media_query = query.to_string();
            }
            if let Some(raw) = el.attr("data-mobile-popup") {
                popup_mode = PopupMode::from_attr(raw);
            }
            if let Some(raw) = el.attr("data-active-anchor") {
                cfg.active_anchor = ActiveAnchor::from_attr(raw);
            }
        }

        cfg.apply_overrides(overrides, &mut popup_mode);

        cfg.mobile_popup = match popup_mode {
            PopupMode::On => true,
            PopupMode::Off => false,
            PopupMode::Auto => probe.matches_media(&cfg.mobile_media_query),
        };
        cfg
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides, popup_mode: &mut PopupMode) {
        if let Some(v) = overrides.max_level {
            self.max_level = v.clamp(1, 3) as u8;
        }
        if let Some(v) = overrides.min_items {
            self.min_items = v.clamp(1, 100) as usize;
        }
        if let Some(v) = overrides.scroll_offset {
            self.scroll_offset = v.clamp(0, 1000) as f64;
        }
        if let Some(v) = overrides.sticky_top {
            self.sticky_top = v.clamp(0, 5000) as f64;
        }
        if let Some(v) = overrides.title_offset {
            self.dynamic_title_offset = v.clamp(0, 1000) as f64;
        }
        if let Some(title) = overrides.default_title.as_ref().filter(|t| !t.is_empty()) {
            self.default_title = title.clone();
        }
        if let Some(anchor) = overrides.active_anchor {
            self.active_anchor = anchor;
        }
        if let Some(query) = overrides.mobile_media_query.as_ref().filter(|q| !q.is_empty()) {
            self.mobile_media_query = query.clone();
        }
        if let Some(mode) = overrides.mobile_popup {
            *popup_mode = mode;
        }
    }
}

fn clamp_attr(el: &Element, name: &str, min: i64, max: i64, fallback: i64) -> i64 {
    clamp_int(el.attr(name).and_then(parse_leading_int), min, max, fallback)
}

pub fn clamp_int(value: Option<i64>, min: i64, max: i64, fallback: i64) -> i64 {
    match value {
        Some(v) => v.clamp(min, max),
        None => fallback,
    }
}

/// Leading-integer parse: optional sign then digits, trailing garbage ignored.
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let value = digits[..end].bytes().fold(0i64, |acc, b| {
        acc.saturating_mul(10).saturating_add(i64::from(b - b'0'))
    });
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Pointer;
    use pretty_assertions::assert_eq;

    struct FixedProbe(bool);

    impl MediaProbe for FixedProbe {
        fn matches_media(&self, _query: &str) -> bool {
            self.0
        }
    }

    fn marker(attrs: &[(&str, &str)]) -> Element {
        attrs
            .iter()
            .fold(Element::new("div").with_attr("id", "outline-config"), |el, (k, v)| {
                el.with_attr(k, *v)
            })
    }

    #[test]
    fn leading_int_parse_ignores_suffixes() {
        assert_eq!(parse_leading_int("120px"), Some(120));
        assert_eq!(parse_leading_int("  -4"), Some(-4));
        assert_eq!(parse_leading_int("px"), None);
        assert_eq!(parse_leading_int(""), None);
        assert_eq!(parse_leading_int("99999999999999999999"), Some(i64::MAX));
        assert_eq!(parse_leading_int("-99999999999999999999px"), Some(-i64::MAX));
    }

    #[test]
    fn oversized_marker_values_clamp_to_the_maximum() {
        let el = marker(&[
            ("data-sticky-top", "99999999999999999999"),
            ("data-min-items", "-99999999999999999999"),
        ]);
        let cfg = OutlineConfig::resolve(Some(&el), &ConfigOverrides::default(), &FixedProbe(false));
        assert_eq!(cfg.sticky_top, 5000.0);
        assert_eq!(cfg.min_items, 1);
    }

    #[test]
    fn defaults_without_marker() {
        let cfg = OutlineConfig::resolve(None, &ConfigOverrides::default(), &FixedProbe(false));
        assert_eq!(cfg, OutlineConfig::default());
    }

    #[test]
    fn marker_values_are_clamped_and_malformed_ones_ignored() {
        let el = marker(&[
            ("data-max-level", "9"),
            ("data-min-items", "0"),
            ("data-scroll-offset", "abc"),
            ("data-sticky-top", "80"),
            ("data-title-offset", "-5"),
            ("data-default-title", ""),
            ("data-active-anchor", "CENTER"),
        ]);
        let cfg = OutlineConfig::resolve(Some(&el), &ConfigOverrides::default(), &FixedProbe(false));
        assert_eq!(cfg.max_level, 3);
        assert_eq!(cfg.min_items, 1);
        assert_eq!(cfg.scroll_offset, 96.0);
        assert_eq!(cfg.sticky_top, 80.0);
        assert_eq!(cfg.dynamic_title_offset, 0.0);
        assert_eq!(cfg.default_title, "Untitled");
        assert_eq!(cfg.active_anchor, ActiveAnchor::Center);
    }

    #[test]
    fn popup_attribute_overrides_media_query() {
        let on = marker(&[("data-mobile-popup", "Yes")]);
        let off = marker(&[("data-mobile-popup", "off")]);
        let auto = marker(&[("data-mobile-popup", "maybe")]);
        let none = ConfigOverrides::default();
        assert!(OutlineConfig::resolve(Some(&on), &none, &FixedProbe(false)).mobile_popup);
        assert!(!OutlineConfig::resolve(Some(&off), &none, &FixedProbe(true)).mobile_popup);
        assert!(OutlineConfig::resolve(Some(&auto), &none, &FixedProbe(true)).mobile_popup);
    }

    #[test]
    fn command_line_wins_over_marker() {
        let el = marker(&[("data-max-level", "1"), ("data-mobile-popup", "on")]);
        let overrides = ConfigOverrides {
            max_level: Some(2),
            sticky_top: Some(9000),
            mobile_popup: Some(PopupMode::Off),
            ..ConfigOverrides::default()
        };
        let cfg = OutlineConfig::resolve(Some(&el), &overrides, &FixedProbe(true));
        assert_eq!(cfg.max_level, 2);
        assert_eq!(cfg.sticky_top, 5000.0);
        assert!(!cfg.mobile_popup);
    }

    #[test]
    fn viewport_probe_treats_bad_queries_as_no_match() {
        let viewport = Viewport {
            width: 300.0,
            height: 600.0,
            pointer: Pointer::Coarse,
            hover: false,
        };
        assert!(viewport.matches_media(DEFAULT_MOBILE_MEDIA_QUERY));
        assert!(!viewport.matches_media("(monochrome)"));
    }
}
