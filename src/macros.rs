//! Internal macros

/// Destructure a [`crate::model::messages::ControlRequest`] variant
/// inside a handler, returning an
/// [`crate::errors::WorkerError::InvalidRequest`] from the handler if
/// the request is some other variant.
///
/// Evaluates to a tuple of the named fields.
///
/// ```rust
/// use dataflow_worker::errors::WorkerResult;
/// use dataflow_worker::expect_request;
/// use dataflow_worker::model::messages::ControlRequest;
///
/// fn debug_cmd(request: ControlRequest) -> WorkerResult<String> {
///     let (cmd,) = expect_request!(request, DebugCommand { cmd });
///     Ok(cmd)
/// }
///
/// let cmd = debug_cmd(ControlRequest::DebugCommand { cmd: "c".to_owned() });
/// assert_eq!(cmd.unwrap(), "c");
/// assert!(debug_cmd(ControlRequest::NoOperation).is_err());
/// ```
#[macro_export]
macro_rules! expect_request {
    ($request:expr, $variant:ident { $($field:ident),+ }) => {
        match $request {
            $crate::model::messages::ControlRequest::$variant { $($field),+ } => ($($field,)+),
            other => {
                return Err($crate::errors::WorkerError::InvalidRequest {
                    method: stringify!($variant).to_owned(),
                    reason: format!("received a {} request", other.method_name()),
                })
            }
        }
    };
}
