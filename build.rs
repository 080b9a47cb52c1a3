use std::path::PathBuf;

fn main() {
    let protos = ["src/proto/device.proto"];
    let mut prost_build = prost_build::Config::new();

    // Prefer compiling the protobufs with prost/protoc when available. In
    // environments without `protoc`, fall back to the vendored, prost-generated
    // output so the crate still builds with identical types.
    if prost_build.compile_protos(&protos, &["src"]).is_err() {
        let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
        let vendored = include_str!("src/proto/generated.rs");
        std::fs::write(out_dir.join("cachet.rs"), vendored)
            .expect("write vendored protobuf output to OUT_DIR");
    }

    println!("cargo:rerun-if-changed=src/proto/device.proto");
    println!("cargo:rerun-if-changed=src/proto/generated.rs");
}
