use chrono::{DateTime, Utc};
use common::domain::{
    ChangeEntity, ChangeNotice, ChangeRecord, DomainResult, GetProductsByIdsInput, ProductField,
    ProductKind, ProductRepository,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Groups raw notices by change number, one record per change number, ordered
/// by change number. Entities start with an empty name.
pub fn aggregate(
    app_changes: &[ChangeNotice],
    package_changes: &[ChangeNotice],
    created_at: DateTime<Utc>,
) -> Vec<ChangeRecord> {
    let mut records: BTreeMap<u32, ChangeRecord> = BTreeMap::new();

    for notice in app_changes {
        record_for(&mut records, notice.change_number, created_at)
            .apps
            .push(ChangeEntity::unnamed(notice.id));
    }
    for notice in package_changes {
        record_for(&mut records, notice.change_number, created_at)
            .packages
            .push(ChangeEntity::unnamed(notice.id));
    }

    records.into_values().collect()
}

fn record_for(
    records: &mut BTreeMap<u32, ChangeRecord>,
    change_id: u32,
    created_at: DateTime<Utc>,
) -> &mut ChangeRecord {
    records.entry(change_id).or_insert_with(|| ChangeRecord {
        change_id,
        created_at,
        apps: Vec::new(),
        packages: Vec::new(),
    })
}

/// Fills entity names with one batched lookup per product kind.
///
/// Products that are not stored yet keep an empty name.
pub async fn resolve_names(
    products: &dyn ProductRepository,
    records: &mut [ChangeRecord],
) -> DomainResult<()> {
    let app_ids: BTreeSet<u32> = records
        .iter()
        .flat_map(|r| r.apps.iter().map(|e| e.id))
        .collect();
    let package_ids: BTreeSet<u32> = records
        .iter()
        .flat_map(|r| r.packages.iter().map(|e| e.id))
        .collect();

    let app_names = load_names(products, ProductKind::App, app_ids).await?;
    let package_names = load_names(products, ProductKind::Package, package_ids).await?;

    for record in records.iter_mut() {
        apply_names(&mut record.apps, &app_names);
        apply_names(&mut record.packages, &package_names);
    }

    Ok(())
}

async fn load_names(
    products: &dyn ProductRepository,
    kind: ProductKind,
    ids: BTreeSet<u32>,
) -> DomainResult<HashMap<u32, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let requested = ids.len();
    let found = products
        .get_products_by_ids(GetProductsByIdsInput {
            kind,
            ids: ids.into_iter().collect(),
            fields: vec![ProductField::Name],
        })
        .await?;

    debug!(kind = %kind, requested, found = found.len(), "resolved change names");
    Ok(found.into_iter().map(|p| (p.id, p.name)).collect())
}

fn apply_names(entities: &mut [ChangeEntity], names: &HashMap<u32, String>) {
    for entity in entities {
        if let Some(name) = names.get(&entity.id) {
            entity.name = name.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{DomainError, MockProductRepository, ProductSummary};

    fn notice(id: u32, change_number: u32) -> ChangeNotice {
        ChangeNotice { id, change_number }
    }

    fn ids(entities: &[ChangeEntity]) -> Vec<u32> {
        entities.iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_aggregate_groups_by_change_number() {
        let now = Utc::now();
        let records = aggregate(&[notice(10, 5), notice(20, 5), notice(30, 6)], &[], now);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].change_id, 5);
        assert_eq!(ids(&records[0].apps), vec![10, 20]);
        assert_eq!(records[1].change_id, 6);
        assert_eq!(ids(&records[1].apps), vec![30]);
        assert!(records.iter().all(|r| r.created_at == now));
        assert!(records
            .iter()
            .flat_map(|r| r.apps.iter())
            .all(|e| e.name.is_empty()));
    }

    #[test]
    fn test_aggregate_merges_apps_and_packages() {
        let records = aggregate(
            &[notice(440, 9)],
            &[notice(0, 9), notice(197, 8)],
            Utc::now(),
        );

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].change_id, 8);
        assert!(records[0].apps.is_empty());
        assert_eq!(ids(&records[0].packages), vec![197]);
        assert_eq!(ids(&records[1].apps), vec![440]);
        assert_eq!(ids(&records[1].packages), vec![0]);
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate(&[], &[], Utc::now()).is_empty());
    }

    #[tokio::test]
    async fn test_resolve_names_batches_per_kind() {
        let mut products = MockProductRepository::new();
        products
            .expect_get_products_by_ids()
            .withf(|input: &GetProductsByIdsInput| {
                input.kind == ProductKind::App
                    && input.ids == vec![10, 20]
                    && input.fields == vec![ProductField::Name]
            })
            .times(1)
            .returning(|_| {
                Ok(vec![ProductSummary {
                    id: 10,
                    name: "Portal".to_string(),
                    ..Default::default()
                }])
            });

        let mut records = aggregate(
            &[notice(10, 5), notice(20, 5), notice(10, 6)],
            &[],
            Utc::now(),
        );
        resolve_names(&products, &mut records).await.unwrap();

        assert_eq!(records[0].apps[0].name, "Portal");
        assert_eq!(records[0].apps[1].name, "");
        assert_eq!(records[1].apps[0].name, "Portal");
    }

    #[tokio::test]
    async fn test_resolve_names_propagates_lookup_failure() {
        let mut products = MockProductRepository::new();
        products
            .expect_get_products_by_ids()
            .times(1)
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("pool timeout"))));

        let mut records = aggregate(&[], &[notice(1, 1)], Utc::now());
        let result = resolve_names(&products, &mut records).await;

        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }
}
