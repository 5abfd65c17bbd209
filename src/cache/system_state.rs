use crate::platform::SystemEnvironment;

/// Snapshot of the environment facts that invalidate rendered icons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStateTracker {
    fingerprint: String,
    locales: Vec<String>,
}

impl SystemStateTracker {
    pub fn compute(environment: &dyn SystemEnvironment) -> Self {
        let locales = environment.locale_tags();
        Self {
            fingerprint: fingerprint(&locales, environment.platform_version()),
            locales,
        }
    }

    pub fn current_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn fingerprint_for_package(
        &self,
        environment: &dyn SystemEnvironment,
        package: &str,
    ) -> String {
        environment.package_fingerprint(package, &self.fingerprint)
    }
}

/// `"<locale-tags>,<version>"`, locales in preference order.
pub fn fingerprint(locales: &[String], platform_version: u32) -> String {
    format!("{},{}", locales.join(","), platform_version)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Env {
        locales: Vec<String>,
        sideloaded: Option<&'static str>,
    }

    impl SystemEnvironment for Env {
        fn locale_tags(&self) -> Vec<String> {
            self.locales.clone()
        }

        fn platform_version(&self) -> u32 {
            34
        }

        fn package_fingerprint(&self, package: &str, global: &str) -> String {
            match self.sideloaded {
                Some(sideloaded) if sideloaded == package => format!("{global},sideloaded"),
                _ => global.to_string(),
            }
        }
    }

    #[test]
    fn fingerprint_joins_locales_then_version() {
        let env = Env {
            locales: vec!["en-US".into(), "fr-FR".into()],
            sideloaded: None,
        };
        let tracker = SystemStateTracker::compute(&env);
        assert_eq!(tracker.current_fingerprint(), "en-US,fr-FR,34");
        assert_eq!(tracker.locales(), ["en-US".to_string(), "fr-FR".to_string()]);
    }

    #[test]
    fn locale_order_changes_fingerprint() {
        let a = fingerprint(&["en-US".into(), "de-DE".into()], 34);
        let b = fingerprint(&["de-DE".into(), "en-US".into()], 34);
        assert_ne!(a, b);
    }

    #[test]
    fn packages_can_override_fingerprint() {
        let env = Env {
            locales: vec!["en-US".into()],
            sideloaded: Some("com.virtual"),
        };
        let tracker = SystemStateTracker::compute(&env);
        assert_eq!(tracker.fingerprint_for_package(&env, "com.normal"), "en-US,34");
        assert_eq!(
            tracker.fingerprint_for_package(&env, "com.virtual"),
            "en-US,34,sideloaded"
        );
    }
}
