//! Small media-query evaluator used to decide the fullscreen popup presentation.

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pointer {
    None,
    Coarse,
    Fine,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub pointer: Pointer,
    pub hover: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum MediaQueryError {
    #[error("empty media query")]
    Empty,
    #[error("expected a parenthesised feature, found `{0}`")]
    ExpectedFeature(String),
    #[error("unknown media feature `{0}`")]
    UnknownFeature(String),
    #[error("invalid value `{value}` for media feature `{feature}`")]
    InvalidValue { feature: String, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Feature {
    Portrait,
    Landscape,
    Pointer(Pointer),
    Hover(bool),
    MinWidth(f64),
    MaxWidth(f64),
    MinHeight(f64),
    MaxHeight(f64),
}

impl Feature {
    fn matches(self, viewport: &Viewport) -> bool {
        match self {
            Feature::Portrait => viewport.height >= viewport.width,
            Feature::Landscape => viewport.width > viewport.height,
            Feature::Pointer(pointer) => viewport.pointer == pointer,
            Feature::Hover(hover) => viewport.hover == hover,
            Feature::MinWidth(px) => viewport.width >= px,
            Feature::MaxWidth(px) => viewport.width <= px,
            Feature::MinHeight(px) => viewport.height >= px,
            Feature::MaxHeight(px) => viewport.height <= px,
        }
    }
}

/// A comma separated list of `and`-joined feature conjunctions.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaQuery {
    alternatives: Vec<Vec<Feature>>,
}

impl MediaQuery {
    pub fn parse(raw: &str) -> Result<Self, MediaQueryError> {
        if raw.trim().is_empty() {
            return Err(MediaQueryError::Empty);
        }
        let alternatives = raw
            .split(',')
            .map(parse_conjunction)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { alternatives })
    }

    pub fn matches(&self, viewport: &Viewport) -> bool {
        self.alternatives
            .iter()
            .any(|features| features.iter().all(|feature| feature.matches(viewport)))
    }
}

fn parse_conjunction(raw: &str) -> Result<Vec<Feature>, MediaQueryError> {
    let mut features = Vec::new();
    let mut rest = raw.trim();
    if let Some(stripped) = rest.strip_prefix("all") {
        rest = stripped.trim_start();
        rest = rest.strip_prefix("and").unwrap_or(rest).trim_start();
    }
    if rest.is_empty() {
        return Ok(features);
    }

    loop {
        let Some(body) = rest.strip_prefix('(') else {
            return Err(MediaQueryError::ExpectedFeature(rest.to_string()));
        };
        let Some(close) = body.find(')') else {
            return Err(MediaQueryError::ExpectedFeature(rest.to_string()));
        };
        features.push(parse_feature(&body[..close])?);
        rest = body[close + 1..].trim_start();
        if rest.is_empty() {
            break;
        }
        rest = rest
            .strip_prefix("and")
            .ok_or_else(|| MediaQueryError::ExpectedFeature(rest.to_string()))?
            .trim_start();
    }
    Ok(features)
}

fn parse_feature(raw: &str) -> Result<Feature, MediaQueryError> {
    let (name, value) = raw
        .split_once(':')
        .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_ascii_lowercase()))
        .ok_or_else(|| MediaQueryError::ExpectedFeature(raw.to_string()))?;
    let invalid = || MediaQueryError::InvalidValue {
        feature: name.clone(),
        value: value.clone(),
    };

    match name.as_str() {
        "orientation" => match value.as_str() {
            "portrait" => Ok(Feature::Portrait),
            "landscape" => Ok(Feature::Landscape),
            _ => Err(invalid()),
        },
        "pointer" => match value.as_str() {
            "none" => Ok(Feature::Pointer(Pointer::None)),
            "coarse" => Ok(Feature::Pointer(Pointer::Coarse)),
            "fine" => Ok(Feature::Pointer(Pointer::Fine)),
            _ => Err(invalid()),
        },
        "hover" => match value.as_str() {
            "none" => Ok(Feature::Hover(false)),
            "hover" => Ok(Feature::Hover(true)),
            _ => Err(invalid()),
        },
        "min-width" => parse_length(&value).map(Feature::MinWidth).ok_or_else(invalid),
        "max-width" => parse_length(&value).map(Feature::MaxWidth).ok_or_else(invalid),
        "min-height" => parse_length(&value).map(Feature::MinHeight).ok_or_else(invalid),
        "max-height" => parse_length(&value).map(Feature::MaxHeight).ok_or_else(invalid),
        _ => Err(MediaQueryError::UnknownFeature(name.clone())),
    }
}

fn parse_length(value: &str) -> Option<f64> {
    let number = value.strip_suffix("px").unwrap_or(value).trim();
    number.parse::<f64>().ok().filter(|n| n.is_finite())
}
