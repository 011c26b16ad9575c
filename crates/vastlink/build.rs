fn main() {
    for (var, exported) in [
        ("TARGET", "VASTLINK_BUILD_TARGET"),
        ("PROFILE", "VASTLINK_BUILD_PROFILE"),
    ] {
        let value = std::env::var(var).unwrap_or_else(|_| "unknown".to_string());
        println!("cargo:rustc-env={exported}={value}");
        println!("cargo:rerun-if-env-changed={var}");
    }
}
