// The news endpoint only accepts `multipart/mixed` with the announcement JSON as
// the single part, so the body is assembled by hand.

use rand::distributions::Alphanumeric;
use rand::Rng;

const BOUNDARY_PREFIX: &str = "xxBOUNDARY";

pub fn new_boundary() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("{}{}", BOUNDARY_PREFIX, suffix)
}

pub fn content_type(boundary: &str) -> String {
    format!("multipart/mixed; boundary={}", boundary)
}

/// One JSON part, CRLF line endings, closing delimiter without trailing CRLF.
pub fn announcement_body(boundary: &str, json: &str) -> String {
    format!(
        "--{b}\r\nContent-Type: application/json\r\n\r\n{json}\r\n--{b}--",
        b = boundary,
        json = json
    )
}
