//! Default managed objects for a database.
//!
//! Every database gets a gRPC `Service`; dedicated and shared databases
//! also get a `Workload` sized to `spec.nodes`. Serverless databases run
//! inside their shared database's compute and own no workload.

use std::collections::BTreeMap;

use dbgrid_core::{DEFAULT_GRPC_PORT, DynamicObject, ObjectKey, WorkloadSpec};
use dbgrid_reconcile::{BuilderCatalog, DatabaseAggregate, ResourceBuilder};

/// Label carrying the owning database name.
pub const DATABASE_LABEL: &str = "dbgrid.io/database";
pub const COMPONENT_LABEL: &str = "dbgrid.io/component";

fn selector_labels(database: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (DATABASE_LABEL.to_string(), database.to_string()),
        (COMPONENT_LABEL.to_string(), "database".to_string()),
    ])
}

pub struct StandardCatalog;

impl BuilderCatalog for StandardCatalog {
    fn builders(&self, aggregate: &DatabaseAggregate) -> Vec<Box<dyn ResourceBuilder>> {
        let labels = selector_labels(aggregate.name());
        let mut builders: Vec<Box<dyn ResourceBuilder>> = vec![Box::new(ServiceBuilder {
            key: ObjectKey::new(aggregate.namespace(), format!("{}-grpc", aggregate.name())),
            port: DEFAULT_GRPC_PORT,
            selector: labels.clone(),
        })];
        if !aggregate.resources().is_serverless() {
            builders.push(Box::new(WorkloadBuilder {
                key: aggregate.key(),
                replicas: aggregate.spec().nodes,
                selector: labels,
            }));
        }
        builders
    }
}

/// gRPC endpoint in front of the database's nodes.
pub struct ServiceBuilder {
    key: ObjectKey,
    port: u16,
    selector: BTreeMap<String, String>,
}

impl ResourceBuilder for ServiceBuilder {
    fn placeholder(&self, _aggregate: &DatabaseAggregate) -> DynamicObject {
        DynamicObject::new("Service", &self.key)
    }

    fn build(&self, target: &mut DynamicObject) -> anyhow::Result<()> {
        target.metadata.labels.extend(self.selector.clone());
        target.spec = serde_json::json!({
            "ports": [{ "name": "grpc", "port": self.port }],
            "selector": self.selector,
        });
        Ok(())
    }
}

/// Compute nodes of a dedicated or shared database.
pub struct WorkloadBuilder {
    key: ObjectKey,
    replicas: u32,
    selector: BTreeMap<String, String>,
}

impl ResourceBuilder for WorkloadBuilder {
    fn placeholder(&self, _aggregate: &DatabaseAggregate) -> DynamicObject {
        DynamicObject::new("Workload", &self.key)
    }

    fn build(&self, target: &mut DynamicObject) -> anyhow::Result<()> {
        if self.replicas == 0 {
            anyhow::bail!("database {} requests zero nodes", self.key);
        }
        target.metadata.labels.extend(self.selector.clone());
        target.spec = serde_json::to_value(WorkloadSpec {
            replicas: self.replicas,
            selector: self.selector.clone(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbgrid_core::{
        Database, DatabaseSpec, DatabaseStatus, NamespacedRef, ObjectMeta, ServerlessResources,
        StorageResources,
    };

    fn aggregate(serverless: bool) -> DatabaseAggregate {
        let mut spec = DatabaseSpec {
            storage_cluster_ref: NamespacedRef::new("storage"),
            nodes: 3,
            domain: "root".to_string(),
            resources: Some(StorageResources::default()),
            shared_resources: None,
            serverless_resources: None,
        };
        if serverless {
            spec.resources = None;
            spec.serverless_resources = Some(ServerlessResources {
                shared_database_ref: NamespacedRef::new("shared"),
            });
        }
        DatabaseAggregate::new(Database {
            metadata: ObjectMeta::new("prod", "orders"),
            spec,
            status: DatabaseStatus::default(),
        })
        .unwrap()
    }

    #[test]
    fn service_then_workload() {
        let aggregate = aggregate(false);
        let builders = StandardCatalog.builders(&aggregate);
        let kinds: Vec<_> = builders
            .iter()
            .map(|b| b.placeholder(&aggregate).kind)
            .collect();
        assert_eq!(kinds, vec!["Service", "Workload"]);
        assert_eq!(builders[0].placeholder(&aggregate).metadata.name, "orders-grpc");
    }

    #[test]
    fn serverless_owns_no_workload() {
        let aggregate = aggregate(true);
        let builders = StandardCatalog.builders(&aggregate);
        assert_eq!(builders.len(), 1);
        assert_eq!(builders[0].placeholder(&aggregate).kind, "Service");
    }

    #[test]
    fn workload_matches_node_count() {
        let aggregate = aggregate(false);
        let builders = StandardCatalog.builders(&aggregate);
        let mut workload = builders[1].placeholder(&aggregate);
        builders[1].build(&mut workload).unwrap();

        assert_eq!(workload.spec["replicas"], 3);
        assert_eq!(workload.spec["selector"][DATABASE_LABEL], "orders");
        assert_eq!(workload.metadata.labels[COMPONENT_LABEL], "database");

        // Rebuilding an already built object is stable.
        let before = workload.clone();
        builders[1].build(&mut workload).unwrap();
        assert_eq!(workload, before);
    }

    #[test]
    fn zero_nodes_is_a_build_error() {
        let builder = WorkloadBuilder {
            key: ObjectKey::new("prod", "orders"),
            replicas: 0,
            selector: selector_labels("orders"),
        };
        let mut target = DynamicObject::new("Workload", &ObjectKey::new("prod", "orders"));
        let err = builder.build(&mut target).unwrap_err();
        assert!(err.to_string().contains("zero nodes"));
    }
}
