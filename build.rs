fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto");

    // Recognizer and health services: server side, plus a client for tests and tooling
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(
            &["proto/recognizer.proto", "proto/health.proto"],
            &["proto"],
        )?;

    // Triton Inference Server subset: client only
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile(&["proto/grpc_service.proto"], &["proto"])?;

    Ok(())
}
