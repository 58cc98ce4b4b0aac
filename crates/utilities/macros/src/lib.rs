#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

/// Sets a gauge, optionally under a label.
///
/// The calling crate must expose a `Metrics` type with the metric name constants and a
/// `metrics` feature; without that feature the macro expands to nothing.
#[macro_export]
macro_rules! set {
    ($instrument:ident, $metric:path, $key:expr, $value:expr, $amount:expr) => {
        #[cfg(feature = "metrics")]
        ::metrics::$instrument!($metric, $key => $value).set($amount as f64);
    };
    ($instrument:ident, $metric:path, $amount:expr) => {
        #[cfg(feature = "metrics")]
        ::metrics::$instrument!($metric).set($amount as f64);
    };
}

/// Increments a counter by one, optionally under a label.
#[macro_export]
macro_rules! inc {
    ($instrument:ident, $metric:path, $key:expr, $value:expr) => {
        #[cfg(feature = "metrics")]
        ::metrics::$instrument!($metric, $key => $value).increment(1);
    };
    ($instrument:ident, $metric:path) => {
        #[cfg(feature = "metrics")]
        ::metrics::$instrument!($metric).increment(1);
    };
}

/// Records a histogram sample, optionally under a label.
#[macro_export]
macro_rules! record {
    ($instrument:ident, $metric:path, $key:expr, $value:expr, $amount:expr) => {
        #[cfg(feature = "metrics")]
        ::metrics::$instrument!($metric, $key => $value).record($amount);
    };
    ($instrument:ident, $metric:path, $amount:expr) => {
        #[cfg(feature = "metrics")]
        ::metrics::$instrument!($metric).record($amount);
    };
}
