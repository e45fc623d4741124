use serde::{Deserialize, Serialize};

/// Entry returned by the engine's `getInstalledApps`, used by the app picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledApp {
    pub app_name: String,
    pub package_name: String,
}

impl InstalledApp {
    pub fn new(app_name: impl Into<String>, package_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            package_name: package_name.into(),
        }
    }

    /// Case-insensitive match on either the display name or the package name.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.app_name.to_lowercase().contains(&query)
            || self.package_name.to_lowercase().contains(&query)
    }
}

pub fn filter_installed_apps<'a>(apps: &'a [InstalledApp], query: &str) -> Vec<&'a InstalledApp> {
    apps.iter().filter(|app| app.matches(query)).collect()
}
