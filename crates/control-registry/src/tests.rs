#[cfg(test)]
mod registry_tests {
    use crate::registry::NodeRegistry;
    use control_core::node::{Node, NodeStatus};
    use control_db::DbClient;
    use uuid::Uuid;

    async fn test_registry() -> NodeRegistry {
        let db = DbClient::connect(":memory:", None)
            .await
            .expect("in-memory store connects");
        NodeRegistry::new(db)
    }

    fn sample_node(model_id: Uuid) -> Node {
        Node {
            id: Uuid::new_v4(),
            cluster_name: Node::derive_cluster_name("aws", "us-east-1"),
            tenant_id: None,
            model_id,
            region_id: Uuid::new_v4(),
            provider: "aws".into(),
            instance_typename: "g5.xlarge".into(),
            endpoint: Some("http://10.0.0.1:8000".into()),
            spot: false,
            status: NodeStatus::Active,
            health_score: 100,
            last_heartbeat_at: Some(chrono::Utc::now()),
        }
    }

    #[tokio::test]
    async fn candidates_for_excludes_other_models_and_unhealthy_nodes() {
        let registry = test_registry().await;
        let model_a = Uuid::new_v4();
        let model_b = Uuid::new_v4();

        let eligible = sample_node(model_a);
        let eligible_id = eligible.id;
        registry.register(eligible).await.unwrap();

        let mut unhealthy = sample_node(model_a);
        unhealthy.health_score = 0;
        registry.register(unhealthy).await.unwrap();

        registry.register(sample_node(model_b)).await.unwrap();

        let candidates = registry.candidates_for(model_a);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, eligible_id);
    }

    #[tokio::test]
    async fn heartbeat_promotes_provisioning_to_active() {
        let registry = test_registry().await;
        let mut node = sample_node(Uuid::new_v4());
        node.status = NodeStatus::Provisioning;
        node.endpoint = None;
        let id = node.id;
        registry.register(node).await.unwrap();

        registry
            .heartbeat(id, 95, Some("http://10.0.0.2:8000".into()))
            .await
            .unwrap();

        let refreshed = registry.get(id).unwrap();
        assert_eq!(refreshed.status, NodeStatus::Active);
        assert_eq!(refreshed.health_score, 95);
    }

    #[tokio::test]
    async fn drain_removes_node_from_scheduling_candidates() {
        let registry = test_registry().await;
        let model_id = Uuid::new_v4();
        let node = sample_node(model_id);
        let id = node.id;
        registry.register(node).await.unwrap();

        registry.drain(id).await.unwrap();

        assert!(registry.candidates_for(model_id).is_empty());
    }

    #[tokio::test]
    async fn demote_zeroes_health_score_alongside_status() {
        let registry = test_registry().await;
        let node = sample_node(Uuid::new_v4());
        let id = node.id;
        registry.register(node).await.unwrap();

        registry.demote(id, NodeStatus::Unhealthy).await.unwrap();

        let refreshed = registry.get(id).unwrap();
        assert_eq!(refreshed.status, NodeStatus::Unhealthy);
        assert_eq!(refreshed.health_score, 0);
    }

    #[tokio::test]
    async fn live_for_deployment_counts_provisioning_and_active_but_not_draining() {
        let registry = test_registry().await;
        let model_id = Uuid::new_v4();

        let active = sample_node(model_id);
        registry.register(active).await.unwrap();

        let mut provisioning = sample_node(model_id);
        provisioning.status = NodeStatus::Provisioning;
        registry.register(provisioning).await.unwrap();

        let draining = sample_node(model_id);
        let draining_id = draining.id;
        registry.register(draining).await.unwrap();
        registry.drain(draining_id).await.unwrap();

        let live = registry.live_for_deployment(model_id, None, None);
        assert_eq!(live.len(), 2);
        assert!(live.iter().all(|n| n.id != draining_id));
    }

    #[tokio::test]
    async fn live_for_deployment_filters_by_provider() {
        let registry = test_registry().await;
        let model_id = Uuid::new_v4();

        registry.register(sample_node(model_id)).await.unwrap();
        let mut other_provider = sample_node(model_id);
        other_provider.provider = "gcp".into();
        registry.register(other_provider).await.unwrap();

        let live = registry.live_for_deployment(model_id, Some("aws"), None);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].provider, "aws");
    }
}
