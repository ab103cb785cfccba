/// Whether an upstream error response means "this model or endpoint does not
/// stream", in which case one non-streaming retry is worthwhile.
///
/// Only client-error statuses qualify; the body must mention streaming and
/// carry one of the known refusal phrasings.
#[must_use]
pub fn is_streaming_rejection(status: http::StatusCode, body: &[u8]) -> bool {
    const REFUSALS: [&[u8]; 7] = [
        b"not supported",
        b"unsupported",
        b"does not support",
        b"not allowed",
        b"not available",
        b"must be false",
        b"cannot be true",
    ];
    if !matches!(status.as_u16(), 400 | 404 | 405 | 422 | 501) {
        return false;
    }
    if !contains_ascii_case_insensitive(body, b"stream") {
        return false;
    }
    REFUSALS
        .iter()
        .any(|needle| contains_ascii_case_insensitive(body, needle))
}

fn contains_ascii_case_insensitive(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if haystack.len() < needle.len() {
        return false;
    }

    haystack.windows(needle.len()).any(|window| {
        window
            .iter()
            .zip(needle.iter())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_streaming_unsupported_message() {
        let body = br#"{"error":{"message":"Streaming is not supported for this model","type":"invalid_request_error"}}"#;
        assert!(is_streaming_rejection(StatusCode::BAD_REQUEST, body));
    }

    #[test]
    fn test_stream_param_must_be_false() {
        let body = br#"{"error":{"message":"Unsupported value: 'stream' does not support true with this model."}}"#;
        assert!(is_streaming_rejection(StatusCode::BAD_REQUEST, body));
    }

    #[test]
    fn test_other_client_errors_are_not_rejections() {
        let body = br#"{"error":{"message":"Invalid model 'sonar-x'"}}"#;
        assert!(!is_streaming_rejection(StatusCode::BAD_REQUEST, body));
        assert!(!is_streaming_rejection(
            StatusCode::UNAUTHORIZED,
            b"stream not supported"
        ));
    }

    #[test]
    fn test_server_errors_are_not_rejections() {
        assert!(!is_streaming_rejection(
            StatusCode::INTERNAL_SERVER_ERROR,
            b"streaming not supported"
        ));
    }

    #[test]
    fn test_case_insensitive_match() {
        assert!(is_streaming_rejection(
            StatusCode::UNPROCESSABLE_ENTITY,
            b"STREAM mode NOT ALLOWED"
        ));
    }
}
