use std::sync::Arc;

use colops_proto::{sse, Connector, ConnectorServer};
use colops_registry::Registry;
use tonic::{Request, Response, Status, Streaming};
use tracing::instrument;

pub mod capabilities;
pub mod dispatch;

pub use capabilities::{CapabilityResponder, PLUGIN_IDENTIFIER, PLUGIN_VERSION};
pub use dispatch::{
    decode_header, drive, DispatchError, Dispatcher, Invocation, Outcome, Phase, RowStream,
};

/// The `Connector` service: capability queries, function calls and scripts.
pub struct ColumnOps {
    responder: CapabilityResponder,
    dispatcher: Dispatcher,
}

impl ColumnOps {
    /// `workers` bounds how many invocations are evaluated at once.
    pub fn new(registry: Arc<Registry>, workers: usize) -> Self {
        Self {
            responder: CapabilityResponder::new(Arc::clone(&registry)),
            dispatcher: Dispatcher::new(registry, workers),
        }
    }

    pub fn into_server(self) -> ConnectorServer<Self> {
        ConnectorServer::new(self)
    }
}

#[async_trait::async_trait]
impl Connector for ColumnOps {
    type ExecuteFunctionStream = RowStream;
    type EvaluateScriptStream = RowStream;

    #[instrument(skip_all)]
    async fn get_capabilities(
        &self,
        _request: Request<sse::Empty>,
    ) -> Result<Response<sse::Capabilities>, Status> {
        let caps = self.responder.capabilities().map_err(|err| {
            tracing::error!(%err, "cannot describe functions");
            Status::internal(err.to_string())
        })?;
        Ok(Response::new(caps))
    }

    async fn execute_function(
        &self,
        request: Request<Streaming<sse::BundledRows>>,
    ) -> Result<Response<Self::ExecuteFunctionStream>, Status> {
        let (metadata, _, inbound) = request.into_parts();
        Ok(self.dispatcher.execute_function(&metadata, inbound).await?)
    }

    async fn evaluate_script(
        &self,
        request: Request<Streaming<sse::BundledRows>>,
    ) -> Result<Response<Self::EvaluateScriptStream>, Status> {
        let (metadata, _, inbound) = request.into_parts();
        Ok(self.dispatcher.evaluate_script(&metadata, inbound).await?)
    }
}
