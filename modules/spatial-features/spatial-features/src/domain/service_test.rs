use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::{Value, json};
use spatial_features_sdk::{
    Attributes, BoundingBox, FeatureInput, FieldDefinition, FieldType, Geometry, GeometryKind,
    NewSpatialTable, SpatialQuery,
};

use super::error::DomainError;
use super::repo::TableLookup;
use super::service::{Service, ServiceConfig};
use crate::test_support::{MockCatalog, MockRepository, column, named_table, table};

struct Harness {
    catalog: Arc<MockCatalog>,
    repo: Arc<MockRepository>,
    service: Service,
}

fn harness_with(catalog: MockCatalog, repo: MockRepository, config: ServiceConfig) -> Harness {
    let catalog = Arc::new(catalog);
    let repo = Arc::new(repo);
    let service = Service::new(catalog.clone(), repo.clone(), config);
    Harness {
        catalog,
        repo,
        service,
    }
}

fn harness() -> Harness {
    let catalog = MockCatalog::with_tables([
        named_table("cities", Some(GeometryKind::Point)),
        named_table("features", None),
        table(
            "buildings",
            Some(GeometryKind::Polygon),
            vec![column("x", "int4", true), column("y", "int4", true)],
        ),
    ]);
    harness_with(catalog, MockRepository::default(), ServiceConfig::default())
}

fn attrs(v: Value) -> Attributes {
    v.as_object().cloned().unwrap()
}

fn point(x: f64, y: f64) -> Geometry {
    Geometry::Point([x, y])
}

fn square() -> Geometry {
    Geometry::Polygon(vec![vec![
        [0.0, 0.0],
        [0.0, 1.0],
        [1.0, 1.0],
        [1.0, 0.0],
        [0.0, 0.0],
    ]])
}

fn input(geometry: Geometry, attributes: Value) -> FeatureInput {
    FeatureInput {
        geometry,
        attributes: attrs(attributes),
    }
}

#[tokio::test]
async fn create_then_read_round_trips() {
    let h = harness();
    let created = h
        .service
        .create_feature("cities", input(point(10.0, 10.0), json!({"name": "Oslo"})))
        .await
        .unwrap();

    let read = h.service.get_feature("cities", created.id).await.unwrap();
    assert_eq!(read.geometry, point(10.0, 10.0));
    assert_eq!(read.attributes["name"], "Oslo");
    assert_eq!(read.attributes["description"], Value::Null);
    assert_eq!(read, created);
}

#[tokio::test]
async fn mismatched_kind_is_rejected_before_repository() {
    let h = harness();
    let line = Geometry::LineString(vec![[0.0, 0.0], [1.0, 1.0]]);

    let err = h
        .service
        .create_feature("cities", input(line, json!({})))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DomainError::GeometryKindMismatch {
            expected: GeometryKind::Point,
            actual: GeometryKind::LineString
        }
    ));
    assert_eq!(h.repo.call_count(), 0);
}

#[tokio::test]
async fn point_is_not_promoted_to_multipoint() {
    let h = harness();
    h.catalog.insert(
        "stops",
        TableLookup::Found(named_table("stops", Some(GeometryKind::MultiPoint))),
    );

    let err = h
        .service
        .create_feature("stops", input(point(1.0, 1.0), json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::GeometryKindMismatch { .. }));
}

#[tokio::test]
async fn generic_table_accepts_every_kind() {
    let h = harness();
    for g in [point(0.0, 0.0), square(), Geometry::MultiPoint(vec![[1.0, 2.0]])] {
        h.service
            .create_feature("features", input(g, json!({"name": "any"})))
            .await
            .unwrap();
    }
    assert_eq!(h.repo.call_count(), 3);
}

#[tokio::test]
async fn invalid_geometry_never_reaches_the_database() {
    let h = harness();
    let open_ring = Geometry::Polygon(vec![vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]]]);

    let err = h
        .service
        .create_feature("buildings", input(open_ring, json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::Validation { .. }));
    assert_eq!(h.catalog.resolve_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.repo.call_count(), 0);
}

#[tokio::test]
async fn delete_twice_reports_not_found() {
    let h = harness();
    let f = h
        .service
        .create_feature("cities", input(point(1.0, 2.0), json!({"name": "a"})))
        .await
        .unwrap();

    h.service.delete_feature("cities", f.id).await.unwrap();
    let err = h.service.delete_feature("cities", f.id).await.unwrap_err();
    assert!(matches!(err, DomainError::FeatureNotFound { id, .. } if id == f.id));

    let err = h.service.get_feature("cities", f.id).await.unwrap_err();
    assert!(matches!(err, DomainError::FeatureNotFound { .. }));
}

#[tokio::test]
async fn update_replaces_attributes_fully() {
    let h = harness();
    let f = h
        .service
        .create_feature("buildings", input(square(), json!({"x": 1, "y": 2})))
        .await
        .unwrap();

    let updated = h
        .service
        .update_feature("buildings", f.id, input(square(), json!({"x": 3})))
        .await
        .unwrap();

    assert_eq!(updated.attributes["x"], 3);
    assert_eq!(updated.attributes["y"], Value::Null);
}

#[tokio::test]
async fn update_of_missing_feature_is_not_found() {
    let h = harness();
    let err = h
        .service
        .update_feature("cities", 404, input(point(0.0, 0.0), json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::FeatureNotFound { id: 404, .. }));
}

#[tokio::test]
async fn unknown_table_is_not_found_for_every_operation() {
    let h = harness();
    let t = "does_not_exist";
    let not_found = |e: DomainError| matches!(e, DomainError::TableNotFound { ref table } if table == t);

    assert!(not_found(
        h.service
            .create_feature(t, input(point(0.0, 0.0), json!({})))
            .await
            .unwrap_err()
    ));
    assert!(not_found(h.service.get_feature(t, 1).await.unwrap_err()));
    assert!(not_found(
        h.service.list_features(t, None, None).await.unwrap_err()
    ));
    assert!(not_found(
        h.service
            .update_feature(t, 1, input(point(0.0, 0.0), json!({})))
            .await
            .unwrap_err()
    ));
    assert!(not_found(h.service.delete_feature(t, 1).await.unwrap_err()));
    assert!(not_found(
        h.service
            .query_features(
                t,
                SpatialQuery::BoundingBox(BoundingBox::from_array([0.0, 0.0, 1.0, 1.0]))
            )
            .await
            .unwrap_err()
    ));
    assert!(not_found(h.service.describe_table(t).await.unwrap_err()));
    assert!(not_found(h.service.drop_table(t).await.unwrap_err()));
    assert_eq!(h.repo.call_count(), 0);
}

#[tokio::test]
async fn unsupported_table_is_reported() {
    let h = harness();
    h.catalog.insert(
        "plain",
        TableLookup::Unsupported("no integer identifier column".to_owned()),
    );
    let err = h.service.get_feature("plain", 1).await.unwrap_err();
    assert!(matches!(err, DomainError::UnsupportedTable { .. }));
}

#[tokio::test]
async fn invalid_table_name_is_rejected_without_lookup() {
    let h = harness();
    let err = h.service.get_feature("bad-name!", 1).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidTableName { .. }));
    assert_eq!(h.catalog.resolve_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn table_names_are_case_folded() {
    let h = harness();
    let f = h
        .service
        .create_feature("Cities", input(point(0.0, 0.0), json!({})))
        .await
        .unwrap();
    assert!(h.service.get_feature("CITIES", f.id).await.is_ok());
}

#[tokio::test]
async fn bbox_query_matches_contained_points() {
    let h = harness();
    h.service
        .create_feature("cities", input(point(10.0, 10.0), json!({"name": "in"})))
        .await
        .unwrap();

    let hits = h
        .service
        .query_features(
            "cities",
            SpatialQuery::BoundingBox(BoundingBox::from_array([0.0, 0.0, 20.0, 20.0])),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    let misses = h
        .service
        .query_features(
            "cities",
            SpatialQuery::BoundingBox(BoundingBox::from_array([30.0, 30.0, 40.0, 40.0])),
        )
        .await
        .unwrap();
    assert!(misses.is_empty());
}

#[tokio::test]
async fn malformed_queries_are_rejected() {
    let h = harness();
    let bad = [
        SpatialQuery::BoundingBox(BoundingBox::from_array([20.0, 0.0, 0.0, 20.0])),
        SpatialQuery::Buffer {
            geometry: point(0.0, 0.0),
            distance: 0.0,
        },
        SpatialQuery::Distance {
            geometry: point(0.0, 0.0),
            meters: -5.0,
        },
        SpatialQuery::Within(Geometry::MultiPolygon(vec![])),
    ];
    for q in bad {
        let err = h.service.query_features("cities", q).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }), "{err}");
    }
    assert_eq!(h.repo.call_count(), 0);
}

#[tokio::test]
async fn list_uses_defaults_and_clamps_limit() {
    let config = ServiceConfig {
        default_page_size: 2,
        max_page_size: 3,
        default_srid: 4326,
    };
    let h = harness_with(
        MockCatalog::with_tables([named_table("cities", Some(GeometryKind::Point))]),
        MockRepository::default(),
        config,
    );
    for i in 0..5 {
        h.service
            .create_feature("cities", input(point(f64::from(i), 0.0), json!({})))
            .await
            .unwrap();
    }

    let page = h.service.list_features("cities", None, None).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.limit, 2);

    let page = h
        .service
        .list_features("cities", Some(1), Some(50))
        .await
        .unwrap();
    assert_eq!(page.limit, 3);
    assert_eq!(page.offset, 1);
    let ids: Vec<i64> = page.items.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![2, 3, 4]);

    let err = h
        .service
        .list_features("cities", None, Some(0))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }));

    let err = h
        .service
        .list_features("cities", Some(u64::MAX), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "skip"));
}

#[tokio::test]
async fn attribute_errors_surface_as_validation() {
    let h = harness();
    let err = h
        .service
        .create_feature("buildings", input(square(), json!({"x": "three"})))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "x"));

    let err = h
        .service
        .create_feature("buildings", input(square(), json!({"colour": "red"})))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "colour"));
}

#[tokio::test]
async fn repository_failures_become_database_errors() {
    let h = harness_with(
        MockCatalog::with_tables([named_table("cities", Some(GeometryKind::Point))]),
        MockRepository::failing(),
        ServiceConfig::default(),
    );
    let err = h.service.get_feature("cities", 1).await.unwrap_err();
    assert!(matches!(err, DomainError::Database(_)));
}

#[tokio::test]
async fn values_refused_by_the_database_surface_as_validation() {
    let h = harness_with(
        MockCatalog::with_tables([table(
            "parcels",
            Some(GeometryKind::Point),
            vec![column("surveyed", "date", true)],
        )]),
        MockRepository::rejecting_data(),
        ServiceConfig::default(),
    );
    let err = h
        .service
        .create_feature("parcels", input(point(1.0, 2.0), json!({"surveyed": "not-a-date"})))
        .await
        .unwrap_err();
    assert!(
        matches!(err, DomainError::Validation { ref field, ref message }
            if field == "attributes" && message.contains("not-a-date")),
        "{err}"
    );

    let err = h
        .service
        .update_feature("parcels", 1, input(point(1.0, 2.0), json!({"surveyed": "later"})))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { .. }), "{err}");
}

#[tokio::test]
async fn buffer_uses_default_srid_and_validates() {
    let h = harness();
    let g = h
        .service
        .buffer_geometry(point(5.0, 5.0), 1.0, None)
        .await
        .unwrap();
    assert_eq!(g.kind(), GeometryKind::Polygon);

    let err = h
        .service
        .buffer_geometry(point(5.0, 5.0), 0.0, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "buffer"));

    let err = h
        .service
        .buffer_geometry(point(5.0, 5.0), 1.0, Some(0))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "srid"));
}

fn new_table(name: &str, fields: Vec<FieldDefinition>) -> NewSpatialTable {
    NewSpatialTable {
        table_name: name.to_owned(),
        geometry_kind: GeometryKind::LineString,
        srid: 4326,
        fields,
    }
}

fn field(name: &str, field_type: FieldType) -> FieldDefinition {
    FieldDefinition {
        name: name.to_owned(),
        field_type,
        nullable: true,
    }
}

#[tokio::test]
async fn create_table_then_use_it() {
    let h = harness();
    let schema = h
        .service
        .create_table(new_table("Roads", vec![field("Lanes", FieldType::Integer)]))
        .await
        .unwrap();
    assert_eq!(schema.name, "roads");
    assert_eq!(schema.geometry_kind, Some(GeometryKind::LineString));
    assert_eq!(schema.columns[0].name, "lanes");

    let line = Geometry::LineString(vec![[0.0, 0.0], [1.0, 1.0]]);
    let f = h
        .service
        .create_feature("roads", input(line, json!({"lanes": 2})))
        .await
        .unwrap();
    assert_eq!(f.attributes["lanes"], 2);

    assert!(h.service.list_tables().await.unwrap().contains(&"roads".to_owned()));
}

#[tokio::test]
async fn create_table_rejects_bad_definitions() {
    let h = harness();

    let err = h
        .service
        .create_table(new_table("cities", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::TableAlreadyExists { .. }));

    let err = h
        .service
        .create_table(new_table("bad-name!", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidTableName { .. }));

    for fields in [
        vec![field("geometry", FieldType::Text)],
        vec![field("ID", FieldType::Text)],
        vec![field("a", FieldType::Text), field("A", FieldType::Integer)],
        vec![field("no spaces", FieldType::Text)],
    ] {
        let err = h
            .service
            .create_table(new_table("t1", fields))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }), "{err}");
    }

    let mut bad_srid = new_table("t2", vec![]);
    bad_srid.srid = 999_999;
    let err = h.service.create_table(bad_srid).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "srid"));
}

#[tokio::test]
async fn concurrent_create_of_same_name_is_a_conflict() {
    let h = harness();
    h.catalog.lose_create_race.store(true, Ordering::SeqCst);
    let err = h
        .service
        .create_table(new_table("Harbours", vec![]))
        .await
        .unwrap_err();
    assert!(
        matches!(err, DomainError::TableAlreadyExists { ref table } if table == "harbours"),
        "{err}"
    );
}

#[tokio::test]
async fn drop_table_removes_it() {
    let h = harness();
    h.service.drop_table("cities").await.unwrap();
    assert_eq!(*h.catalog.dropped.lock().unwrap(), vec!["cities".to_owned()]);
    let err = h.service.describe_table("cities").await.unwrap_err();
    assert!(matches!(err, DomainError::TableNotFound { .. }));
}
