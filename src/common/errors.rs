use anyhow::Error;
use log::error;

/// Log the whole context chain of `error` once and hand it back.
pub fn handle_error(error: Error) -> Error {
    let mut message = error.to_string();
    for cause in error.chain().skip(1) {
        message.push_str("\n  caused by: ");
        message.push_str(&cause.to_string());
    }
    error!("{}", message);
    error
}
