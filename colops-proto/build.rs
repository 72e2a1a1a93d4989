use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic::codec::ProstCodec";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Messages live in src/sse.rs; only the service plumbing is generated, so
    // no protoc is needed on the build host.
    let connector = Service::builder()
        .name("Connector")
        .package("qlik.sse")
        .method(
            Method::builder()
                .name("get_capabilities")
                .route_name("GetCapabilities")
                .input_type("crate::sse::Empty")
                .output_type("crate::sse::Capabilities")
                .codec_path(CODEC)
                .build(),
        )
        .method(
            Method::builder()
                .name("execute_function")
                .route_name("ExecuteFunction")
                .input_type("crate::sse::BundledRows")
                .output_type("crate::sse::BundledRows")
                .codec_path(CODEC)
                .client_streaming()
                .server_streaming()
                .build(),
        )
        .method(
            Method::builder()
                .name("evaluate_script")
                .route_name("EvaluateScript")
                .input_type("crate::sse::BundledRows")
                .output_type("crate::sse::BundledRows")
                .codec_path(CODEC)
                .client_streaming()
                .server_streaming()
                .build(),
        )
        .build();

    Builder::new().compile(&[connector]);
}
