//! Discovery of compiled service descriptor modules.
//!
//! A descriptor tree holds one logical service per directory:
//!
//! ```text
//! descriptors/
//!   order/
//!     order_pb.binpb        message definitions
//!     order_pb_grpc.binpb   service definitions
//! ```
//!
//! Each `.binpb` file is a serialized `FileDescriptorSet`.

use crate::descriptor::{
    leading_comments, Declaration, MethodDeclaration, ServiceDeclaration,
};
use crate::error::{GatewayError, GatewayResult};
use prost::Message;
use prost_reflect::{DescriptorPool, MessageDescriptor};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Role of a descriptor module within its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleRole {
    /// `*_pb_grpc.binpb`: declares services
    ServiceDefinitions,
    /// `*_pb.binpb`: declares messages
    MessageDefinitions,
}

/// One descriptor file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorModule {
    pub path: PathBuf,
    pub role: ModuleRole,
}

/// Descriptor modules sharing a service directory
#[derive(Debug, Clone)]
pub struct ServiceModuleGroup {
    pub dir: PathBuf,
    pub modules: Vec<DescriptorModule>,
}

/// Scans a descriptor tree
#[derive(Debug, Clone)]
pub struct Discovery {
    root: PathBuf,
    pattern: Regex,
}

impl Discovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pattern: Regex::new(r"_(pb(_grpc)?)\.binpb$").expect("is valid regex"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Role of a file by name, `None` if it is not a descriptor module
    pub fn classify(&self, file_name: &str) -> Option<ModuleRole> {
        self.pattern.captures(file_name).map(|caps| {
            if caps.get(2).is_some() {
                ModuleRole::ServiceDefinitions
            } else {
                ModuleRole::MessageDefinitions
            }
        })
    }

    /// Find all descriptor modules, grouped by directory and sorted by path
    pub fn discover(&self) -> GatewayResult<Vec<ServiceModuleGroup>> {
        if !self.root.is_dir() {
            return Err(GatewayError::Discovery {
                path: self.root.clone(),
                reason: "not a directory".to_string(),
            });
        }

        let mut grouped: BTreeMap<PathBuf, Vec<DescriptorModule>> = BTreeMap::new();
        self.walk(&self.root, &mut grouped)?;

        let groups: Vec<_> = grouped
            .into_iter()
            .map(|(dir, modules)| ServiceModuleGroup { dir, modules })
            .collect();

        info!(
            root = %self.root.display(),
            groups = groups.len(),
            "Discovered descriptor modules"
        );
        Ok(groups)
    }

    fn walk(
        &self,
        dir: &Path,
        grouped: &mut BTreeMap<PathBuf, Vec<DescriptorModule>>,
    ) -> GatewayResult<()> {
        let read_err = |e: std::io::Error| GatewayError::Discovery {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        };

        let mut entries = fs::read_dir(dir)
            .map_err(read_err)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err)?;
        entries.sort();

        for path in entries {
            if path.is_dir() {
                self.walk(&path, grouped)?;
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(role) = self.classify(file_name) else {
                continue;
            };

            debug!(path = %path.display(), ?role, "Found descriptor module");
            grouped
                .entry(dir.to_path_buf())
                .or_default()
                .push(DescriptorModule { path, role });
        }

        Ok(())
    }
}

impl ServiceModuleGroup {
    /// Group name (the directory name)
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Decode every module and build the group's registries
    pub fn load(&self) -> GatewayResult<LoadedGroup> {
        let mut files: Vec<FileDescriptorProto> = Vec::new();
        let mut seen = HashSet::new();
        let mut service_files = HashSet::new();

        for module in &self.modules {
            let bytes = fs::read(&module.path).map_err(|e| GatewayError::Discovery {
                path: module.path.clone(),
                reason: e.to_string(),
            })?;
            let set = FileDescriptorSet::decode(bytes.as_slice()).map_err(|e| {
                GatewayError::Discovery {
                    path: module.path.clone(),
                    reason: format!("not a FileDescriptorSet: {}", e),
                }
            })?;

            if module.role == ModuleRole::ServiceDefinitions {
                service_files.extend(target_files(&set.file));
            }
            for file in set.file {
                if seen.insert(file.name().to_string()) {
                    files.push(file);
                }
            }
        }

        let comments = leading_comments(&files);
        let pool = DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: files })
            .map_err(|e| GatewayError::Discovery {
                path: self.dir.clone(),
                reason: e.to_string(),
            })?;

        Ok(LoadedGroup::build(
            self.name(),
            pool,
            &comments,
            Some(&service_files),
        ))
    }
}

/// Files of a set that no other file in the set imports. `protoc
/// --include_imports` puts dependencies in the set too; only the targets
/// declare the group's own services.
fn target_files(files: &[FileDescriptorProto]) -> Vec<String> {
    let imported: HashSet<&str> = files
        .iter()
        .flat_map(|file| file.dependency.iter().map(String::as_str))
        .collect();
    files
        .iter()
        .map(FileDescriptorProto::name)
        .filter(|name| !imported.contains(name))
        .map(str::to_string)
        .collect()
}

/// Message types visible to one group
#[derive(Debug, Clone)]
pub struct MessageRegistry {
    pool: DescriptorPool,
    by_name: HashMap<String, MessageDescriptor>,
}

impl MessageRegistry {
    /// Register every top-level message by short name; a later file wins
    pub fn new(pool: DescriptorPool) -> Self {
        let mut by_name = HashMap::new();
        for file in pool.files() {
            for message in file.messages() {
                by_name.insert(message.name().to_string(), message);
            }
        }
        Self { pool, by_name }
    }

    /// Resolve a type name: short name first, then fully qualified, then
    /// relative to `package`
    pub fn get(&self, name: &str, package: &str) -> Option<MessageDescriptor> {
        let name = name.trim_start_matches('.');
        self.by_name
            .get(name)
            .cloned()
            .or_else(|| self.pool.get_message_by_name(name))
            .or_else(|| {
                if package.is_empty() {
                    None
                } else {
                    self.pool
                        .get_message_by_name(&format!("{}.{}", package, name))
                }
            })
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

/// Services and messages of one group
#[derive(Debug, Clone)]
pub struct LoadedGroup {
    name: String,
    services: Vec<ServiceDeclaration>,
    registry: MessageRegistry,
}

impl LoadedGroup {
    /// Build a group from an already assembled pool. Every service in the
    /// pool is declared; `comments` maps fully qualified names to their
    /// documentation.
    pub fn from_pool(
        name: impl Into<String>,
        pool: DescriptorPool,
        comments: &HashMap<String, String>,
    ) -> Self {
        Self::build(name.into(), pool, comments, None)
    }

    fn build(
        name: String,
        pool: DescriptorPool,
        comments: &HashMap<String, String>,
        service_files: Option<&HashSet<String>>,
    ) -> Self {
        let doc = |full_name: &str| comments.get(full_name).cloned().unwrap_or_default();
        let mut declared = HashSet::new();
        let mut services = Vec::new();

        for file in pool.files() {
            if service_files.map_or(false, |names| !names.contains(file.name())) {
                continue;
            }

            for service in file.services() {
                if !declared.insert(service.full_name().to_string()) {
                    continue;
                }

                let methods = service
                    .methods()
                    .map(|method| MethodDeclaration {
                        declaration: Declaration::new(
                            method.name(),
                            method.full_name(),
                            doc(method.full_name()),
                        ),
                        input: method.input(),
                        output: method.output(),
                    })
                    .collect();

                services.push(ServiceDeclaration {
                    declaration: Declaration::new(
                        service.name(),
                        service.full_name(),
                        doc(service.full_name()),
                    ),
                    methods,
                });
            }
        }

        let registry = MessageRegistry::new(pool);
        debug!(
            group = %name,
            services = services.len(),
            messages = registry.len(),
            "Loaded descriptor group"
        );

        Self {
            name,
            services,
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn services(&self) -> &[ServiceDeclaration] {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut [ServiceDeclaration] {
        &mut self.services
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    pub fn into_parts(self) -> (Vec<ServiceDeclaration>, MessageRegistry) {
        (self.services, self.registry)
    }
}
