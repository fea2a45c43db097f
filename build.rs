/// Appalyzer build script
/// Runs at compile time before the main application is built
/// - Injects app identity (name, version, id) into Rust code
/// - Processes tauri.conf.json when the desktop shell is enabled
fn main() {
    println!("cargo:rerun-if-env-changed=APPALYZER_NAME");

    let name = std::env::var("APPALYZER_NAME").unwrap_or_else(|_| "Appalyzer".to_string());
    let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

    // Normalize name for file system use (lowercase, alphanumeric + hyphens only)
    let app_id = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect::<String>();

    // Inject into Rust code via environment variables (accessible with env!() macro)
    println!("cargo:rustc-env=APP_NAME={}", name);
    println!("cargo:rustc-env=APP_VERSION={}", version);
    println!("cargo:rustc-env=APP_ID={}", app_id);

    #[cfg(feature = "desktop")]
    tauri_build::build()
}
