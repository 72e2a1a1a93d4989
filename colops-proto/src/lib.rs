//! Wire contract of the analytics platform's server-side extension protocol.
//!
//! The message types are maintained by hand in `sse.rs`; the `Connector`
//! client and server are generated by `build.rs`.

pub mod sse {
    include!("sse.rs");
    include!(concat!(env!("OUT_DIR"), "/qlik.sse.Connector.rs"));
}

pub use sse::connector_client::ConnectorClient;
pub use sse::connector_server::{Connector, ConnectorServer};

/// Binary header carrying the `FunctionRequestHeader` of an `ExecuteFunction` call.
pub const FUNCTION_REQUEST_HEADER: &str = "qlik-functionrequestheader-bin";
/// Binary header carrying the `ScriptRequestHeader` of an `EvaluateScript` call.
pub const SCRIPT_REQUEST_HEADER: &str = "qlik-scriptrequestheader-bin";
/// Binary header carrying the `CommonRequestHeader` (app and user of the caller).
pub const COMMON_REQUEST_HEADER: &str = "qlik-commonrequestheader-bin";
/// Response header holding a serialized `TableDescription`.
pub const TABLE_DESCRIPTION_HEADER: &str = "qlik-tabledescription-bin";
/// Response header with the client-side cache directive.
pub const CACHE_HEADER: &str = "qlik-cache";
/// Value of [`CACHE_HEADER`] that forbids the client from caching a response.
pub const CACHE_NO_STORE: &str = "no-store";
