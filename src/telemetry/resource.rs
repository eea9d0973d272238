// SPDX-License-Identifier: MIT
//! Process identity shared by every telemetry pipeline.
//!
//! [`ResourceProvider`] builds the OpenTelemetry [`Resource`] lazily and at most
//! once: the SDK defaults (`telemetry.sdk.*`, `OTEL_RESOURCE_ATTRIBUTES`) are
//! merged with one detector per environment dimension (host, OS, process,
//! container) and finally with the configured service identity.
//!
//! A detector that cannot read its data source returns an empty resource, so a
//! missing dimension never fails the build.
use std::path::PathBuf;
use std::sync::OnceLock;

use opentelemetry::KeyValue;
use opentelemetry_sdk::resource::ResourceDetector;
use opentelemetry_sdk::Resource;

use super::TelemetryConfig;

type BuildFn = Box<dyn Fn() -> Resource + Send + Sync>;

/// Memoized [`Resource`] for one process.
///
/// The first call to [`ResourceProvider::get`] runs the build; concurrent
/// callers block until it completes and all of them observe the same value.
pub struct ResourceProvider {
    cell: OnceLock<Resource>,
    build: BuildFn,
}

impl ResourceProvider {
    /// Provider that builds the standard resource for `cfg`.
    pub fn new(cfg: &TelemetryConfig) -> Self {
        let identity = ServiceIdentity::from(cfg);
        Self::from_fn(move || identity.build())
    }

    /// Provider backed by an arbitrary build function.
    pub fn from_fn<F>(build: F) -> Self
    where
        F: Fn() -> Resource + Send + Sync + 'static,
    {
        Self {
            cell: OnceLock::new(),
            build: Box::new(build),
        }
    }

    /// Returns the resource, building it on first use.
    pub fn get(&self) -> &Resource {
        self.cell.get_or_init(|| (self.build)())
    }

    /// Whether the resource has been built yet.
    pub fn is_built(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl std::fmt::Debug for ResourceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceProvider")
            .field("resource", &self.cell.get())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
struct ServiceIdentity {
    name: String,
    version: String,
    environment: String,
}

impl From<&TelemetryConfig> for ServiceIdentity {
    fn from(cfg: &TelemetryConfig) -> Self {
        Self {
            name: cfg.service_name.clone(),
            version: cfg.service_version.clone(),
            environment: cfg.environment.clone(),
        }
    }
}

impl ServiceIdentity {
    fn build(&self) -> Resource {
        let detectors: Vec<Box<dyn ResourceDetector>> = vec![
            Box::new(HostDetector),
            Box::new(OsDetector),
            Box::new(ProcessDetector),
            Box::new(ContainerDetector::default()),
        ];
        Resource::builder()
            .with_detectors(&detectors)
            .with_service_name(self.name.clone())
            .with_attributes([
                KeyValue::new("service.version", self.version.clone()),
                KeyValue::new("deployment.environment", self.environment.clone()),
            ])
            .build()
    }
}

/// `host.name` and `host.arch`.
#[derive(Debug, Default)]
pub struct HostDetector;

impl ResourceDetector for HostDetector {
    fn detect(&self) -> Resource {
        let mut attributes = vec![KeyValue::new("host.arch", std::env::consts::ARCH)];
        if let Some(name) = hostname() {
            attributes.push(KeyValue::new("host.name", name));
        }
        Resource::builder_empty().with_attributes(attributes).build()
    }
}

fn hostname() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// `os.type`.
#[derive(Debug, Default)]
pub struct OsDetector;

impl ResourceDetector for OsDetector {
    fn detect(&self) -> Resource {
        Resource::builder_empty()
            .with_attribute(KeyValue::new("os.type", std::env::consts::OS))
            .build()
    }
}

/// `process.pid`, executable name and runtime.
#[derive(Debug, Default)]
pub struct ProcessDetector;

impl ResourceDetector for ProcessDetector {
    fn detect(&self) -> Resource {
        let mut attributes = vec![
            KeyValue::new("process.pid", i64::from(std::process::id())),
            KeyValue::new("process.runtime.name", "rust"),
        ];
        if let Some(name) = std::env::current_exe()
            .ok()
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        {
            attributes.push(KeyValue::new("process.executable.name", name));
        }
        Resource::builder_empty().with_attributes(attributes).build()
    }
}

/// `container.id`, read from the cgroup file of the current process.
#[derive(Debug)]
pub struct ContainerDetector {
    cgroup_path: PathBuf,
}

impl Default for ContainerDetector {
    fn default() -> Self {
        Self::with_cgroup_path("/proc/self/cgroup")
    }
}

impl ContainerDetector {
    /// Detector reading container membership from `path`.
    pub fn with_cgroup_path(path: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_path: path.into(),
        }
    }
}

impl ResourceDetector for ContainerDetector {
    fn detect(&self) -> Resource {
        let id = std::fs::read_to_string(&self.cgroup_path)
            .ok()
            .and_then(|contents| container_id(&contents));
        match id {
            Some(id) => Resource::builder_empty()
                .with_attribute(KeyValue::new("container.id", id))
                .build(),
            None => Resource::builder_empty().build(),
        }
    }
}

/// First 64-character hex segment found in a cgroup listing.
fn container_id(cgroup: &str) -> Option<String> {
    cgroup
        .lines()
        .flat_map(|line| line.split(['/', ':', '-', '.']))
        .find(|segment| segment.len() == 64 && segment.chars().all(|c| c.is_ascii_hexdigit()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn has_key(resource: &Resource, key: &str) -> bool {
        resource.iter().any(|(k, _)| k.as_str() == key)
    }

    #[test]
    fn concurrent_first_use_builds_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let provider = ResourceProvider::from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Resource::builder_empty()
                .with_attribute(KeyValue::new("service.name", "concurrent"))
                .build()
        });

        let seen: Vec<&Resource> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16).map(|_| scope.spawn(|| provider.get())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(seen.len(), 16);
        assert!(seen.iter().all(|r| std::ptr::eq(*r, seen[0])));
        assert!(has_key(seen[0], "service.name"));
    }

    #[test]
    fn build_is_lazy() {
        let provider = ResourceProvider::from_fn(|| Resource::builder_empty().build());
        assert!(!provider.is_built());
        provider.get();
        assert!(provider.is_built());
    }

    #[test]
    fn standard_resource_carries_identity_and_environment() {
        let cfg = TelemetryConfig {
            service_name: "forecast-test".into(),
            service_version: "9.9.9".into(),
            environment: "test".into(),
            ..TelemetryConfig::default()
        };
        let provider = ResourceProvider::new(&cfg);
        let resource = provider.get();

        let service = resource
            .iter()
            .find(|(k, _)| k.as_str() == "service.name")
            .map(|(_, v)| v.to_string());
        assert_eq!(service.as_deref(), Some("forecast-test"));
        assert!(has_key(resource, "service.version"));
        assert!(has_key(resource, "deployment.environment"));
        assert!(has_key(resource, "os.type"));
        assert!(has_key(resource, "process.pid"));
        assert!(has_key(resource, "host.arch"));
    }

    #[test]
    fn missing_cgroup_file_omits_container() {
        let detector = ContainerDetector::with_cgroup_path("/definitely/not/here/cgroup");
        assert!(detector.detect().is_empty());
    }

    #[test]
    fn container_id_is_parsed_from_cgroup_v1_and_v2() {
        let id = "a".repeat(64);
        let v1 = format!("12:pids:/docker/{id}\n11:cpu:/docker/{id}\n");
        assert_eq!(container_id(&v1).as_deref(), Some(id.as_str()));

        let v2 = format!("0::/system.slice/docker-{id}.scope\n");
        assert_eq!(container_id(&v2).as_deref(), Some(id.as_str()));

        assert_eq!(container_id("0::/user.slice\n"), None);
    }
}
