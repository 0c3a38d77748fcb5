//! Image command parsing and URL building
//!
//! `/image [WxH] prompt` produces a deterministic URL on the image
//! endpoint; the photo itself is fetched by Telegram, never by us.

use super::format::escape_html;
use crate::error::{GatewayError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

/// Direct-message prefix (the trailing space is part of it)
pub const IMAGE_COMMAND_PREFIX: &str = "/image ";

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 1024;

static RESOLUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(\d+)[xX](\d+)\s+(.+)$").unwrap());
static INLINE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^/?image\s+(.+)$").unwrap());

/// Parsed image request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub width: u32,
    pub height: u32,
    pub prompt: String,
}

impl ImageRequest {
    /// Parse the text after the command word: `[WxH] prompt`
    pub fn parse(args: &str) -> Self {
        if let Some(caps) = RESOLUTION.captures(args) {
            if let (Ok(width), Ok(height)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) {
                return Self {
                    width,
                    height,
                    prompt: caps[3].trim().to_string(),
                };
            }
        }

        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            prompt: args.trim().to_string(),
        }
    }

    /// Parse a full direct message, if it is an image command
    pub fn from_command(text: &str) -> Option<Self> {
        text.strip_prefix(IMAGE_COMMAND_PREFIX).map(Self::parse)
    }

    /// Parse an inline query of the form `image ...` or `/image ...`
    pub fn from_inline_query(query: &str) -> Option<Self> {
        INLINE_IMAGE
            .captures(query)
            .map(|caps| Self::parse(&caps[1]))
    }

    pub fn has_prompt(&self) -> bool {
        !self.prompt.is_empty()
    }

    /// `WxH` label
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// HTML caption for the photo
    pub fn caption(&self) -> String {
        format!("🎨 <b>{}</b>\n\n{}", escape_html(&self.prompt), self.resolution())
    }

    /// `{endpoint}/{prompt}?width=W&height=H&model=flux&nologo=true`
    pub fn url(&self, endpoint: &str) -> Result<Url> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| GatewayError::Config(format!("invalid IMAGE_ENDPOINT {}: {}", endpoint, e)))?;

        url.path_segments_mut()
            .map_err(|_| GatewayError::Config(format!("IMAGE_ENDPOINT cannot take a path: {}", endpoint)))?
            .pop_if_empty()
            .push(&self.prompt);

        url.query_pairs_mut()
            .append_pair("width", &self.width.to_string())
            .append_pair("height", &self.height.to_string())
            .append_pair("model", "flux")
            .append_pair("nologo", "true");

        Ok(url)
    }
}
