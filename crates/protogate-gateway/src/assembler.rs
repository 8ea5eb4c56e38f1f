//! Startup pipeline: discovery, descriptor parsing and route building

use crate::annotation::AnnotationParser;
use crate::config::GatewayConfig;
use crate::descriptor::DescriptorParser;
use crate::discovery::Discovery;
use crate::error::GatewayResult;
use crate::model::ModelLoader;
use crate::route::{RouteBuilder, RouteDescriptor};
use protogate_client::Connector;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Assembles every route of a descriptor tree.
///
/// Runs once at startup. Any error aborts the whole assembly.
pub struct Assembler {
    discovery: Discovery,
    parser: DescriptorParser,
    loader: ModelLoader,
    routes: RouteBuilder,
}

impl Assembler {
    pub fn new(root: impl Into<PathBuf>, connector: Arc<dyn Connector>) -> Self {
        Self {
            discovery: Discovery::new(root),
            parser: DescriptorParser::default(),
            loader: ModelLoader::default(),
            routes: RouteBuilder::new(connector),
        }
    }

    /// Assembler configured from the `descriptors_dir`, annotation and model
    /// settings of `config`
    pub fn from_config(config: &GatewayConfig, connector: Arc<dyn Connector>) -> Self {
        let parser = DescriptorParser::new(AnnotationParser::new(&config.annotation_marker))
            .policy(config.invalid_attributes)
            .strip_documentation(config.strip_documentation);

        Self::new(config.descriptors_dir.clone(), connector)
            .parser(parser)
            .loader(ModelLoader::new(config.model_cache_key))
    }

    pub fn parser(mut self, parser: DescriptorParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn loader(mut self, loader: ModelLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Routes of every group, in discovery then declaration order
    pub fn assemble(mut self) -> GatewayResult<Vec<RouteDescriptor>> {
        let groups = self.discovery.discover()?;
        let mut routes = Vec::new();
        let mut services = 0;

        for group in &groups {
            let loaded = group.load()?;
            debug!(group = %loaded.name(), "Loaded descriptor group");

            for service in self.parser.parse_group(loaded, &mut self.loader)? {
                routes.extend(self.routes.build(&service)?);
                services += 1;
            }
        }

        info!(
            root = %self.discovery.root().display(),
            groups = groups.len(),
            services,
            models = self.loader.len(),
            routes = routes.len(),
            "Assembled gateway routes"
        );
        Ok(routes)
    }
}
