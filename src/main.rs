// Prevents additional console window on Windows in release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

/// Entry point of the Appalyzer desktop shell
fn main() {
    // Log the panic through tracing before exiting, so it lands in the same
    // output as the rest of the shell's logs
    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!("Application panic: {}", panic_info);
        eprintln!("Application panic: {}", panic_info);
        std::process::exit(1);
    }));

    appalyzer_lib::run();
}
