/// This macro wraps `tracing::trace!` and should not be confused with insta snapshot testing.
/// It tags a logging statement with a snapshot name and the data being captured, so that log
/// tooling can follow how requests and responses change on their way through a pipeline.
///
/// Passing a value serializes it to JSON with serde_json and tags the snapshot with the value's
/// type name:
/// ```ignore
/// snapshot!(response, "response after dehoisting");
/// // Generates:
/// // trace!(snapshot = "graphql_relocate::graphql::Response", data = "{ .. }", "response after dehoisting");
/// ```
/// Passing a name tag records the value's `Display` form instead, which is how documents are
/// captured:
/// ```ignore
/// snapshot!("DelegatedRequest", request.document, "request after hoisting");
/// // Generates:
/// // trace!(snapshot = "DelegatedRequest", data = %request.document, "request after hoisting");
/// ```
macro_rules! snapshot {
    ($value:expr, $msg:literal) => {
        #[cfg(feature = "snapshot_tracing")]
        tracing::trace!(
            snapshot = std::any::type_name_of_val(&$value),
            data = serde_json::to_string(&$value).unwrap_or_default(),
            $msg
        );
    };
    ($name:literal, $value:expr, $msg:literal) => {
        #[cfg(feature = "snapshot_tracing")]
        tracing::trace!(snapshot = $name, data = %$value, $msg);
    };
}

pub(crate) use snapshot;
