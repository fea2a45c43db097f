pub const APP_NAME: &str = env!("APP_NAME");
pub const APP_VERSION: &str = env!("APP_VERSION");
pub const APP_ID: &str = env!("APP_ID");

pub const APP_IDENTIFIER: &str = concat!("com.", env!("APP_ID"), ".shell");
pub const STORE_FILE_NAME: &str = concat!(env!("APP_ID"), ".json");

/// Command-line switch carried by desktop shortcuts to open one app directly
pub const APP_ID_ARG: &str = "--app-id=";

/// Formats the shell window title for the app currently shown
/// `None` restores the plain application title used on the home view
pub fn window_title(app_name: Option<&str>) -> String {
    match app_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{} - {}", name, APP_NAME),
        None => APP_NAME.to_string(),
    }
}
