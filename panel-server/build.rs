fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // Pass through PANEL_GIT_HASH from the deployment build environment
    println!("cargo:rerun-if-env-changed=PANEL_GIT_HASH");
    if let Ok(hash) = std::env::var("PANEL_GIT_HASH") {
        println!("cargo:rustc-env=PANEL_GIT_HASH={}", hash);
    }
}
