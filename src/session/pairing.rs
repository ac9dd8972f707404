use tracing::{info, warn};

const SCAN_HINT: &str = "Scan with WhatsApp: Settings > Linked Devices > Link a Device";

/// Tallest QR rendering printed before truncating.
const MAX_QR_LINES: usize = 25;

/// Render a pairing challenge as a text QR code.
pub fn render_qr(code: &str) -> Result<String, qrcode::types::QrError> {
    let qr = qrcode::QrCode::new(code)?;
    Ok(qr
        .render::<char>()
        .quiet_zone(false)
        .module_dimensions(2, 1)
        .build())
}

/// Print a QR pairing challenge for the operator.
///
/// Uses `qr2term` for a compact colored rendering and falls back to the
/// plain `qrcode` renderer, then to the raw payload.
pub fn display_pairing_challenge(code: &str) {
    println!("\n📱 Scan this QR code with WhatsApp");
    if let Err(e) = qr2term::print_qr(code) {
        warn!("qr2term failed: {}, falling back to qrcode crate", e);
        match render_qr(code) {
            Ok(rendered) => {
                let lines: Vec<&str> = rendered.lines().collect();
                for line in lines.iter().take(MAX_QR_LINES) {
                    println!("{}", line);
                }
                if lines.len() > MAX_QR_LINES {
                    println!("\n(QR code truncated to {} lines)", MAX_QR_LINES);
                }
            }
            Err(e2) => {
                warn!("Failed to generate QR code: {}", e2);
                println!("Raw QR code data: {}", code);
            }
        }
    }
    println!("\n{}", SCAN_HINT);
    info!("pairing QR code displayed");
}

/// Print a numeric pairing code for the operator.
pub fn display_pairing_code(code: &str) {
    println!("\n🤖 WhatsApp Pairing Code: {}\nEnter this code on your phone.\n", code);
    info!("pairing code displayed");
}
