use crate::models::ScanResult;
use std::collections::HashSet;

/// Ingestion filter for raw scanner output
///
/// Applies the checks in order and reports the first failure:
/// 1. Instrument identifier present (not empty or whitespace)
/// 2. Score is a finite number
/// 3. Effective score is a finite number
///
/// Returns (is_valid, reason) tuple
pub fn is_valid_scan(scan: &ScanResult) -> (bool, String) {
    // 1. Identifier
    if scan.instrument.trim().is_empty() {
        return (false, "MissingInstrument: empty identifier".to_string());
    }

    // 2. Score
    if !scan.score.is_finite() {
        return (
            false,
            format!("InvalidData: score {} is NaN or infinite", scan.score),
        );
    }

    // 3. Ranking key
    if !scan.effective_score.is_finite() {
        return (
            false,
            format!(
                "InvalidData: effective score {} is NaN or infinite",
                scan.effective_score
            ),
        );
    }

    (true, "Ok".to_string())
}

/// Drop malformed and duplicate scan results, keeping scan order
///
/// The first occurrence of an instrument wins. Nothing here is an error;
/// rejected rows are only logged.
pub fn sanitize_scan(results: Vec<ScanResult>) -> Vec<ScanResult> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(results.len());

    for mut scan in results {
        let (valid, reason) = is_valid_scan(&scan);
        if !valid {
            tracing::debug!(instrument = %scan.instrument, "Skipping scan result: {}", reason);
            continue;
        }

        scan.instrument = scan.instrument.trim().to_string();
        if !seen.insert(scan.instrument.clone()) {
            tracing::debug!(instrument = %scan.instrument, "Skipping duplicate scan result");
            continue;
        }

        kept.push(scan);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_scan(instrument: &str, score: f64) -> ScanResult {
        ScanResult {
            instrument: instrument.to_string(),
            score,
            effective_score: score,
        }
    }

    #[test]
    fn test_valid_scan() {
        let (valid, reason) = is_valid_scan(&create_test_scan("KRW-BTC", 0.7));
        assert!(valid);
        assert_eq!(reason, "Ok");
    }

    #[test]
    fn test_negative_score_is_valid() {
        let (valid, _) = is_valid_scan(&create_test_scan("KRW-XRP", -0.3));
        assert!(valid);
    }

    #[test]
    fn test_empty_instrument_rejected() {
        let (valid, reason) = is_valid_scan(&create_test_scan("   ", 0.7));
        assert!(!valid);
        assert!(reason.contains("MissingInstrument"));
    }

    #[test]
    fn test_nan_score_rejected() {
        let mut scan = create_test_scan("KRW-BTC", 0.7);
        scan.effective_score = f64::NAN;

        let (valid, reason) = is_valid_scan(&scan);
        assert!(!valid);
        assert!(reason.contains("effective score"));
    }

    #[test]
    fn test_sanitize_drops_bad_rows_and_duplicates() {
        let results = vec![
            create_test_scan("KRW-BTC", 0.9),
            create_test_scan("", 0.8),
            create_test_scan("KRW-ETH", f64::INFINITY),
            create_test_scan(" KRW-BTC ", 0.1),
            create_test_scan("KRW-SOL", 0.5),
        ];

        let kept = sanitize_scan(results);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].instrument, "KRW-BTC");
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].instrument, "KRW-SOL");
    }

    #[test]
    fn test_sanitize_empty() {
        assert!(sanitize_scan(Vec::new()).is_empty());
    }
}
