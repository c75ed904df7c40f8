//! Unit tests for the reconciliation pass, against the NetworkAPI mock and
//! an in-memory Kubernetes store.

#[cfg(test)]
mod tests {
    use crate::config::{FINALIZER, TAKE_OVER_ANNOTATION};
    use crate::error::{ControllerError, ValidationError};
    use crate::store::EventKind;
    use crate::test_utils::*;
    use crate::watcher::ObjectKey;
    use k8s_openapi::api::networking::v1::Ingress;
    use kube_runtime::controller::Action;
    use networkapi_client::{
        IdRef, Ip, MockCalls, MockNetworkApiClient, NetworkApiClientTrait, Vip, VipOptions, VipPool, VipPort,
        VipPortOptions,
    };
    use serde_json::json;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const VIP_NAME: &str = "kube-napi-ingress__default_ingress-1";
    const HTTP_POOL: &str = "kube-napi-ingress__default_ingress-1_http";
    const HTTPS_POOL: &str = "kube-napi-ingress__default_ingress-1_https";

    fn annotate(mut ingress: Ingress, key: &str, value: &str) -> Ingress {
        ingress
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
        ingress
    }

    fn mark_deleted(store: &FakeKubeStore, key: &ObjectKey) {
        let mut ingress = store.ingress(key).unwrap();
        ingress.metadata.deletion_timestamp = Some(serde_json::from_value(json!("2024-01-01T00:00:00Z")).unwrap());
        store.add_ingress(ingress);
    }

    /// The externally managed VIP "vip-blah" on 100.10.10.10, port 80 pointing at pool 111
    fn seed_external_vip(client: &MockNetworkApiClient) -> Vip {
        client.add_ip(Ip {
            id: Some(8000),
            networkipv4: IdRef(99),
            description: "vip-blah".to_string(),
            ..Ip::from_ipv4(Ipv4Addr::new(100, 10, 10, 10))
        });
        client.add_vip(Vip {
            id: Some(500),
            name: "vip-blah".to_string(),
            service: "legacy".to_string(),
            business: "legacy".to_string(),
            environmentvip: IdRef(1),
            ipv4: Some(IdRef(8000)),
            ports: vec![VipPort {
                id: Some(29),
                port: 80,
                options: VipPortOptions {
                    l4_protocol: IdRef(3),
                    l7_protocol: IdRef(4),
                },
                pools: vec![VipPool {
                    id: Some(10),
                    server_pool: IdRef(111),
                    l7_rule: IdRef(5),
                    order: None,
                }],
            }],
            created: false,
            ..Default::default()
        })
    }

    fn take_over_setup(port: u16, tls: bool) -> (MockNetworkApiClient, FakeKubeStore, ObjectKey) {
        let client = MockNetworkApiClient::new();
        seed_external_vip(&client);

        let store = FakeKubeStore::new();
        let mut spec = json!({"defaultBackend": {"service": {"name": "example-service", "port": {"number": port}}}});
        if tls {
            spec["tls"] = json!([{"hosts": ["example.com"], "secretName": "example-tls"}]);
        }
        let ingress = annotate(create_test_ingress("ingress-1", spec), TAKE_OVER_ANNOTATION, "vip-blah");
        let key = store.add_ingress(ingress);

        let name = if port == 443 { "https" } else { "http" };
        let mut service = create_test_service("example-service", "LoadBalancer", json!([{"name": name, "port": port}]));
        service.status = Some(serde_json::from_value(json!({"loadBalancer": {"ingress": [{"ip": "10.1.1.1"}]}})).unwrap());
        store.add_service(service);

        (client, store, key)
    }

    fn endpoints_setup(addresses: &[&str]) -> (MockNetworkApiClient, FakeKubeStore, ObjectKey) {
        let client = MockNetworkApiClient::new();
        client.set_vip_addresses(1, 50, vec![Ipv4Addr::new(192, 0, 2, 10)]);
        let store = FakeKubeStore::new();
        let key = store.add_ingress(create_default_backend_ingress("ingress-1", "example-service", 80));
        store.add_service(create_test_service(
            "example-service",
            "ClusterIP",
            json!([{"name": "http", "port": 80, "targetPort": 8080}]),
        ));
        set_endpoints(&store, addresses);
        (client, store, key)
    }

    fn set_endpoints(store: &FakeKubeStore, addresses: &[&str]) {
        let addresses: Vec<_> = addresses.iter().map(|ip| json!({"ip": ip})).collect();
        store.add_endpoints(create_test_endpoints(
            "example-service",
            json!([{"addresses": addresses, "ports": [{"name": "http", "port": 8080}]}]),
        ));
    }

    /// TLS Ingress with one rule per listener, both on the same LoadBalancer Service
    fn tls_setup() -> (MockNetworkApiClient, FakeKubeStore, ObjectKey) {
        let client = MockNetworkApiClient::new();
        client.set_vip_addresses(1, 50, vec![Ipv4Addr::new(192, 0, 2, 10)]);

        let store = FakeKubeStore::new();
        let rule = |port: u16| {
            json!({"host": "example.com", "http": {"paths": [
                {"path": "/", "pathType": "Prefix",
                 "backend": {"service": {"name": "example-service", "port": {"number": port}}}}
            ]}})
        };
        let key = store.add_ingress(create_test_ingress(
            "ingress-1",
            json!({
                "tls": [{"hosts": ["example.com"], "secretName": "example-tls"}],
                "rules": [rule(80), rule(443)]
            }),
        ));
        let mut service = create_test_service(
            "example-service",
            "LoadBalancer",
            json!([{"name": "http", "port": 80}, {"name": "https", "port": 443}]),
        );
        service.status = Some(serde_json::from_value(json!({"loadBalancer": {"ingress": [{"ip": "10.1.1.1"}]}})).unwrap());
        store.add_service(service);

        (client, store, key)
    }

    fn load_balancer_setup() -> (MockNetworkApiClient, FakeKubeStore, ObjectKey) {
        let client = MockNetworkApiClient::new();
        client.set_vip_addresses(1, 50, vec![Ipv4Addr::new(192, 0, 2, 10), Ipv4Addr::new(192, 0, 2, 11)]);

        let store = FakeKubeStore::new();
        let key = store.add_ingress(create_default_backend_ingress("ingress-1", "example-service", 80));
        store.add_service(create_lb_service("example-service", 80, Some("10.1.1.1")));

        (client, store, key)
    }

    #[tokio::test]
    async fn test_take_over_updates_and_deploys_existing_vip() {
        let (client, store, key) = take_over_setup(80, false);
        let reconciler = create_test_reconciler(&client, &store);

        let action = reconciler.reconcile(&key).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(300)));

        let calls = client.calls();
        assert_eq!(calls.vip_updates, vec![500]);
        assert_eq!(calls.vip_deploys, vec![500]);
        assert!(calls.vip_creates.is_empty());
        assert_eq!(calls.pool_creates, vec![HTTP_POOL.to_string()]);
        assert_eq!(store.status_ip(&key).as_deref(), Some("100.10.10.10"));

        let pool = client.pool(HTTP_POOL).unwrap();
        let vip = client.vip("vip-blah").unwrap();
        assert_eq!(vip.ipv4, Some(IdRef(8000)));
        assert_eq!(vip.service, "legacy");
        assert_eq!(vip.business, "legacy");
        assert_eq!(vip.options, VipOptions::default());
        assert_eq!(vip.ports.len(), 1);
        assert_eq!(vip.ports[0].id, Some(29));
        assert_eq!(vip.ports[0].pools[0].id, Some(10));
        assert_eq!(vip.ports[0].pools[0].server_pool, IdRef(pool.id.unwrap()));

        assert!(client.vip(VIP_NAME).is_none());
    }

    #[tokio::test]
    async fn test_take_over_with_tls_builds_only_https_pool() {
        let (client, store, key) = take_over_setup(443, true);
        let reconciler = create_test_reconciler(&client, &store);

        reconciler.reconcile(&key).await.unwrap();

        assert!(client.pool(HTTP_POOL).is_none());
        let pool = client.pool(HTTPS_POOL).unwrap();
        assert_eq!(pool.default_port, 443);
        assert_eq!(pool.server_pool_members.len(), 1);
        assert_eq!(pool.server_pool_members[0].identifier, "10.1.1.1");
        assert_eq!(pool.server_pool_members[0].port_real, 443);

        let vip = client.vip("vip-blah").unwrap();
        assert_eq!(vip.ports.iter().map(|port| port.port).collect::<Vec<_>>(), vec![443]);
        assert_eq!(client.calls().vip_deploys.len(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_changes_nothing() {
        let (client, store, key) = take_over_setup(80, false);
        let reconciler = create_test_reconciler(&client, &store);

        reconciler.reconcile(&key).await.unwrap();
        client.reset_calls();
        reconciler.reconcile(&key).await.unwrap();

        assert_eq!(client.calls(), MockCalls::default());
    }

    #[tokio::test]
    async fn test_creates_everything_for_new_ingress() {
        let (client, store, key) = load_balancer_setup();
        let reconciler = create_test_reconciler(&client, &store);

        reconciler.reconcile(&key).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls.equipment_creates, vec!["kube-napi-ingress__10.1.1.1".to_string()]);
        assert_eq!(
            calls.ip_creates,
            vec![Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::new(192, 0, 2, 10)]
        );
        assert_eq!(calls.pool_creates, vec![HTTP_POOL.to_string()]);
        assert_eq!(calls.vip_creates, vec![VIP_NAME.to_string()]);
        assert_eq!(calls.vip_deploys.len(), 1);
        assert!(calls.vip_updates.is_empty());

        let real = client.equipment("kube-napi-ingress__10.1.1.1").unwrap();
        assert_eq!(real.equipment_type, IdRef(20));
        assert_eq!(real.groups[0].id, 22);

        let vip = client.vip(VIP_NAME).unwrap();
        assert!(vip.created);
        assert_eq!(vip.environmentvip, IdRef(1));
        assert_eq!(vip.ports.len(), 1);
        assert_eq!(vip.ports[0].port, 80);
        assert_eq!(vip.options.traffic_return, IdRef(9));
        assert_eq!(store.status_ip(&key).as_deref(), Some("192.0.2.10"));

        client.reset_calls();
        reconciler.reconcile(&key).await.unwrap();
        assert_eq!(client.calls(), MockCalls::default());
        assert_eq!(store.status_ip(&key).as_deref(), Some("192.0.2.10"));
    }

    #[tokio::test]
    async fn test_cluster_name_is_part_of_every_name() {
        let (client, store, key) = load_balancer_setup();
        let mut config = create_test_config();
        config.cluster_name = "c1".to_string();
        let reconciler = create_test_reconciler_with_config(&client, &store, config);

        reconciler.reconcile(&key).await.unwrap();

        let vip = client.vip("kube-napi-ingress_c1_default_ingress-1").unwrap();
        assert_eq!(vip.business, "c1");
        assert!(client.pool("kube-napi-ingress_c1_default_ingress-1_http").is_some());
        assert!(client.equipment("kube-napi-ingress_c1_10.1.1.1").is_some());
    }

    #[tokio::test]
    async fn test_endpoint_members_are_sorted() {
        let (client, store, key) = endpoints_setup(&["192.168.0.9", "192.168.0.2"]);
        let reconciler = create_test_reconciler(&client, &store);

        reconciler.reconcile(&key).await.unwrap();

        let pool = client.pool(HTTP_POOL).unwrap();
        let members: Vec<_> = pool
            .server_pool_members
            .iter()
            .map(|member| (member.identifier.as_str(), member.port_real))
            .collect();
        assert_eq!(members, vec![("192.168.0.2", 8080), ("192.168.0.9", 8080)]);
        assert!(client.calls().ip_creates.contains(&Ipv4Addr::new(192, 168, 0, 9)));
    }

    #[tokio::test]
    async fn test_member_order_from_networkapi_is_ignored() {
        let (client, store, key) = endpoints_setup(&["192.168.0.9", "192.168.0.2"]);
        let reconciler = create_test_reconciler(&client, &store);
        reconciler.reconcile(&key).await.unwrap();

        let mut pool = client.pool(HTTP_POOL).unwrap();
        pool.server_pool_members.reverse();
        client.add_pool(pool);
        client.reset_calls();
        reconciler.reconcile(&key).await.unwrap();

        assert_eq!(client.calls(), MockCalls::default());
    }

    #[tokio::test]
    async fn test_endpoint_change_updates_pool_in_place() {
        let (client, store, key) = endpoints_setup(&["192.168.0.2", "192.168.0.9"]);
        let reconciler = create_test_reconciler(&client, &store);
        reconciler.reconcile(&key).await.unwrap();
        let before = client.pool(HTTP_POOL).unwrap();
        let kept_id = before.server_pool_members[0].id;
        assert_eq!(before.server_pool_members[0].identifier, "192.168.0.2");
        assert!(kept_id.is_some());

        set_endpoints(&store, &["192.168.0.2", "192.168.0.5"]);
        client.reset_calls();
        reconciler.reconcile(&key).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls.pool_updates, vec![before.id.unwrap()]);
        assert!(calls.pool_creates.is_empty());
        assert!(calls.vip_updates.is_empty());

        let after = client.pool(HTTP_POOL).unwrap();
        let members: Vec<_> = after
            .server_pool_members
            .iter()
            .map(|member| member.identifier.as_str())
            .collect();
        assert_eq!(members, vec!["192.168.0.2", "192.168.0.5"]);
        assert_eq!(after.server_pool_members[0].id, kept_id);
        assert_ne!(after.server_pool_members[1].id, kept_id);
    }

    #[tokio::test]
    async fn test_tls_ingress_serves_both_listeners() {
        let (client, store, key) = tls_setup();
        let reconciler = create_test_reconciler(&client, &store);
        reconciler.reconcile(&key).await.unwrap();

        let http = client.pool(HTTP_POOL).unwrap();
        let https = client.pool(HTTPS_POOL).unwrap();
        assert_eq!(http.server_pool_members[0].port_real, 80);
        assert_eq!(https.server_pool_members[0].port_real, 443);

        let vip = client.vip(VIP_NAME).unwrap();
        let ports: Vec<_> = vip.ports.iter().map(|p| (p.port, p.pools[0].server_pool)).collect();
        assert_eq!(
            ports,
            vec![(80, IdRef(http.id.unwrap())), (443, IdRef(https.id.unwrap()))]
        );

        // port order as returned by NetworkAPI does not matter
        let mut reordered = vip.clone();
        reordered.ports.reverse();
        client.add_vip(reordered);
        client.reset_calls();
        reconciler.reconcile(&key).await.unwrap();
        assert_eq!(client.calls(), MockCalls::default());

        mark_deleted(&store, &key);
        reconciler.reconcile(&key).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls.vip_deletes, vec![vip.id.unwrap()]);
        assert_eq!(calls.ip_deletes.len(), 1);
        assert_eq!(calls.pool_deletes.len(), 2);
        assert!(client.pool(HTTP_POOL).is_none());
        assert!(client.pool(HTTPS_POOL).is_none());
    }

    #[tokio::test]
    async fn test_annotations_override_instance_ids() {
        let client = MockNetworkApiClient::new();
        client.set_vip_addresses(77, 50, vec![Ipv4Addr::new(192, 0, 2, 77)]);
        let store = FakeKubeStore::new();
        let ingress = annotate(
            create_default_backend_ingress("ingress-1", "example-service", 80),
            "kube-napi-ingress.microscaler.io/vipEnvironmentID",
            "77",
        );
        let key = store.add_ingress(ingress);
        store.add_service(create_lb_service("example-service", 80, Some("10.1.1.1")));
        let reconciler = create_test_reconciler(&client, &store);

        reconciler.reconcile(&key).await.unwrap();

        assert_eq!(client.vip(VIP_NAME).unwrap().environmentvip, IdRef(77));
        assert_eq!(store.status_ip(&key).as_deref(), Some("192.0.2.77"));
    }

    #[tokio::test]
    async fn test_adds_finalizer_and_indexes_service() {
        let (client, store, key) = load_balancer_setup();
        let reconciler = create_test_reconciler(&client, &store);

        reconciler.reconcile(&key).await.unwrap();

        let finalizers = store.ingress(&key).unwrap().metadata.finalizers.unwrap();
        assert_eq!(finalizers, vec![FINALIZER.to_string()]);
        assert_eq!(
            reconciler.index().service_for(&key),
            Some(ObjectKey::new("default", "example-service"))
        );
        assert_eq!(store.event_reasons(), vec!["Reconciling", "Reconciled"]);
    }

    #[tokio::test]
    async fn test_validation_failure_is_reported() {
        let client = MockNetworkApiClient::new();
        let store = FakeKubeStore::new();
        let key = store.add_ingress(create_test_ingress(
            "ingress-1",
            json!({"rules": [{"http": {"paths": [
                {"path": "/", "pathType": "Prefix", "backend": {"service": {"name": "a", "port": {"number": 80}}}},
                {"path": "/api", "pathType": "Prefix", "backend": {"service": {"name": "a", "port": {"number": 80}}}}
            ]}}]}),
        ));
        let reconciler = create_test_reconciler(&client, &store);

        let err = reconciler.reconcile(&key).await.unwrap_err();
        assert!(matches!(err, ControllerError::Validation(ValidationError::MultiplePaths)));

        let failed = store.events().into_iter().last().unwrap();
        assert_eq!(failed.kind, EventKind::Warning);
        assert_eq!(failed.reason, "ReconcileFailed");
        assert_eq!(failed.note, "failed to reconcile: Ingress can have only one path");
        assert_eq!(client.calls(), MockCalls::default());
    }

    #[tokio::test]
    async fn test_missing_service_fails() {
        let client = MockNetworkApiClient::new();
        let store = FakeKubeStore::new();
        let key = store.add_ingress(create_default_backend_ingress("ingress-1", "example-service", 80));
        let reconciler = create_test_reconciler(&client, &store);

        let err = reconciler.reconcile(&key).await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidBackend(_)));
        assert!(reconciler.index().service_for(&key).is_none());
    }

    #[tokio::test]
    async fn test_deletion_cleans_up_networkapi() {
        let (client, store, key) = load_balancer_setup();
        let reconciler = create_test_reconciler(&client, &store);
        reconciler.reconcile(&key).await.unwrap();
        let vip_ip = client.vip(VIP_NAME).unwrap().ipv4.unwrap();

        mark_deleted(&store, &key);
        client.reset_calls();
        let action = reconciler.reconcile(&key).await.unwrap();
        assert_eq!(action, Action::await_change());

        let calls = client.calls();
        assert_eq!(calls.vip_deletes.len(), 1);
        assert_eq!(calls.ip_deletes, vec![vip_ip.0]);
        assert_eq!(calls.pool_deletes.len(), 1);
        assert!(client.vip(VIP_NAME).is_none());
        assert!(client.pool(HTTP_POOL).is_none());
        // the real address stays registered
        assert_eq!(client.ip_count(), 1);

        assert_eq!(store.ingress(&key).unwrap().metadata.finalizers, Some(Vec::new()));
        assert!(reconciler.index().service_for(&key).is_none());
    }

    #[tokio::test]
    async fn test_deletion_resumes_after_vip_is_gone() {
        let (client, store, key) = load_balancer_setup();
        let reconciler = create_test_reconciler(&client, &store);
        reconciler.reconcile(&key).await.unwrap();
        client.delete_vip(&client.vip(VIP_NAME).unwrap()).await.unwrap();

        mark_deleted(&store, &key);
        client.reset_calls();
        let action = reconciler.reconcile(&key).await.unwrap();
        assert_eq!(action, Action::await_change());

        let calls = client.calls();
        assert!(calls.vip_deletes.is_empty());
        assert_eq!(calls.ip_deletes.len(), 1);
        assert_eq!(calls.pool_deletes.len(), 1);
        assert!(client.pool(HTTP_POOL).is_none());
        assert_eq!(store.ingress(&key).unwrap().metadata.finalizers, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_deletion_keeps_taken_over_vip() {
        let (client, store, key) = take_over_setup(80, false);
        let reconciler = create_test_reconciler(&client, &store);
        reconciler.reconcile(&key).await.unwrap();

        mark_deleted(&store, &key);
        client.reset_calls();
        reconciler.reconcile(&key).await.unwrap();

        assert_eq!(client.calls(), MockCalls::default());
        assert!(client.vip("vip-blah").is_some());
        assert!(client.pool(HTTP_POOL).is_some());
        assert_eq!(store.ingress(&key).unwrap().metadata.finalizers, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_missing_ingress_cleans_up_by_name() {
        let (client, store, key) = load_balancer_setup();
        let reconciler = create_test_reconciler(&client, &store);
        reconciler.reconcile(&key).await.unwrap();

        store.remove_ingress(&key);
        let action = reconciler.reconcile(&key).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(client.calls().vip_deletes.len(), 1);
        assert!(client.vip(VIP_NAME).is_none());
        assert!(client.pool(HTTP_POOL).is_none());
        assert!(reconciler.index().service_for(&key).is_none());
    }

    #[tokio::test]
    async fn test_missing_ingress_without_objects_is_quiet() {
        let client = MockNetworkApiClient::new();
        let store = FakeKubeStore::new();
        let reconciler = create_test_reconciler(&client, &store);

        let action = reconciler.reconcile(&ObjectKey::new("default", "gone")).await.unwrap();
        assert_eq!(action, Action::await_change());
        assert_eq!(client.calls(), MockCalls::default());
        assert!(store.events().is_empty());
    }

    #[tokio::test]
    async fn test_backoff_grows_and_resets() {
        let client = MockNetworkApiClient::new();
        let store = FakeKubeStore::new();
        let reconciler = create_test_reconciler(&client, &store);
        let key = ObjectKey::new("default", "ingress-1");

        let first = reconciler.next_backoff(&key);
        let second = reconciler.next_backoff(&key);
        let third = reconciler.next_backoff(&key);
        assert_eq!(first, Duration::from_secs(60));
        assert!(third > second);

        reconciler.reset_backoff(&key);
        assert_eq!(reconciler.next_backoff(&key), first);
    }
}
