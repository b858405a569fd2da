//! Build script for generating Rust code from Protocol Buffers

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(&["proto/auth.proto"], &["proto"])?;

    Ok(())
}
