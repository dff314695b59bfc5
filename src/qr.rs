//! QR payload rendering.
//!
//! WhatsApp Web hands over an opaque pairing payload; callers want an image.
//! [`to_data_url`] produces the inline `data:image/png;base64,…` form the
//! HTTP API returns, [`to_terminal_string`] the Unicode half-block form
//! printed to the console for headless logins.

use std::io::Cursor;

use anyhow::{Context, Result};
use base64::Engine;
use qrcode::render::unicode;
use qrcode::QrCode;

/// Render a QR payload as a base64 PNG data URL.
///
/// Deterministic: the same payload always yields the same URL.
pub fn to_data_url(payload: &str) -> Result<String> {
    let code = QrCode::new(payload.as_bytes()).context("QR payload rejected by the encoder")?;
    let image = code.render::<image::Luma<u8>>().build();
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .context("PNG encoding failed")?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
    Ok(format!("data:image/png;base64,{encoded}"))
}

/// Render a QR payload as Unicode half-blocks for terminal display.
///
/// Colors are inverted so the code scans correctly on dark terminals.
pub fn to_terminal_string(payload: &str) -> Result<String> {
    let code = QrCode::new(payload.as_bytes()).context("QR payload rejected by the encoder")?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}
