use chrono::{DateTime, SubsecRound, Utc};
use docrepo_core::{
    DbError, Entity, EntityMeta, Field, Filter, Repository, SqliteBackend, StoreError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Invoice {
    #[serde(flatten)]
    meta: EntityMeta,
    number: String,
    amount: i64,
    batch: String,
}

impl Entity for Invoice {
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

fn invoice(number: &str, amount: i64) -> Invoice {
    Invoice {
        meta: EntityMeta::default(),
        number: number.to_string(),
        amount,
        batch: "default".to_string(),
    }
}

fn repo() -> Repository {
    Repository::new(SqliteBackend::in_memory().unwrap())
}

#[tokio::test]
async fn add_assigns_fresh_metadata_and_get_round_trips() {
    let repo = repo();
    let before = Utc::now().trunc_subsecs(3);

    let mut first = invoice("INV-1", 100);
    let first_id = repo.add(&mut first).await.unwrap();
    let mut second = invoice("INV-2", 200);
    let second_id = repo.add(&mut second).await.unwrap();

    assert!(!first_id.is_nil());
    assert_ne!(first_id, second_id);
    assert_eq!(first.id(), first_id);
    assert!(first.added() >= before);
    assert!(second.added() >= first.added());
    assert!(!first.is_deleted());

    let loaded: Invoice = repo.get(first_id).await.unwrap().unwrap();
    assert_eq!(loaded, first);
}

#[tokio::test]
async fn add_overwrites_caller_supplied_id() {
    let repo = repo();
    let preset = Uuid::new_v4();
    let mut entity = invoice("INV-1", 1);
    entity.meta.id = preset;

    let id = repo.add(&mut entity).await.unwrap();
    assert_ne!(id, preset);
    assert!(repo.get::<Invoice>(preset).await.unwrap().is_none());
}

#[tokio::test]
async fn get_unknown_id_returns_none() {
    let repo = repo();
    assert!(repo.get::<Invoice>(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn soft_deleted_entities_are_hidden_unless_requested() {
    let repo = repo();
    let mut kept = invoice("INV-1", 10);
    let mut removed = invoice("INV-2", 20);
    repo.add(&mut kept).await.unwrap();
    repo.add(&mut removed).await.unwrap();

    assert!(repo.delete::<Invoice>(removed.id()).await.unwrap());

    let visible: Vec<Invoice> = repo.find(Filter::All, false).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id(), kept.id());
    assert_eq!(repo.count::<Invoice>(Filter::All, false).await.unwrap(), 1);
    assert_eq!(repo.count::<Invoice>(Filter::All, true).await.unwrap(), 2);

    let by_number = Field::new("number").eq("INV-2");
    assert!(!repo.any::<Invoice>(by_number.clone(), false).await.unwrap());
    assert!(repo.any::<Invoice>(by_number.clone(), true).await.unwrap());
    assert!(repo
        .first::<Invoice>(by_number, false)
        .await
        .unwrap()
        .is_none());

    let tombstone: Invoice = repo.get(removed.id()).await.unwrap().unwrap();
    assert!(tombstone.is_deleted());
}

#[tokio::test]
async fn delete_then_restore_only_toggles_the_flag() {
    let repo = repo();
    let mut entity = invoice("INV-7", 700);
    repo.add(&mut entity).await.unwrap();

    repo.delete::<Invoice>(entity.id()).await.unwrap();
    assert!(repo.restore::<Invoice>(entity.id()).await.unwrap());

    let restored: Invoice = repo.get(entity.id()).await.unwrap().unwrap();
    assert_eq!(restored, entity);
    assert_eq!(repo.count::<Invoice>(Filter::All, false).await.unwrap(), 1);
}

#[tokio::test]
async fn id_addressed_mutations_of_unknown_entities_fail_with_not_found() {
    let repo = repo();
    let id = Uuid::new_v4();

    let delete_err = repo.delete::<Invoice>(id).await.unwrap_err();
    assert!(matches!(
        delete_err,
        StoreError::EntityNotFound { ref collection, id: missing } if collection == "Invoice" && missing == id
    ));
    assert!(repo.restore::<Invoice>(id).await.unwrap_err().is_not_found());

    let mut ghost = invoice("INV-404", 0);
    ghost.meta.id = id;
    assert!(repo.replace(&mut ghost).await.unwrap_err().is_not_found());
    assert_eq!(repo.count::<Invoice>(Filter::All, true).await.unwrap(), 0);
}

#[tokio::test]
async fn replace_keeps_stored_added_and_deleted() {
    let repo = repo();
    let mut entity = invoice("INV-1", 100);
    repo.add(&mut entity).await.unwrap();
    let stored_added = entity.added();
    repo.delete::<Invoice>(entity.id()).await.unwrap();

    entity.amount = 150;
    entity.meta.added = DateTime::<Utc>::default();
    entity.meta.deleted = false;
    assert!(repo.replace(&mut entity).await.unwrap());

    assert_eq!(entity.added(), stored_added);
    assert!(entity.is_deleted());

    let stored: Invoice = repo.get(entity.id()).await.unwrap().unwrap();
    assert_eq!(stored.amount, 150);
    assert_eq!(stored.added(), stored_added);
    assert!(stored.is_deleted());
}

#[tokio::test]
async fn replace_with_nil_id_adds_the_entity() {
    let repo = repo();
    let mut entity = invoice("INV-new", 5);

    assert!(repo.replace(&mut entity).await.unwrap());
    assert!(!entity.id().is_nil());

    let stored: Invoice = repo.get(entity.id()).await.unwrap().unwrap();
    assert_eq!(stored, entity);
}

#[tokio::test]
async fn single_distinguishes_none_one_and_many() {
    let repo = repo();
    for (number, amount) in [("A", 1), ("B", 2), ("C", 2)] {
        repo.add(&mut invoice(number, amount)).await.unwrap();
    }

    let none = repo
        .single::<Invoice>(Field::new("amount").eq(99), false)
        .await
        .unwrap();
    assert!(none.is_none());

    let one = repo
        .single::<Invoice>(Field::new("amount").eq(1), false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(one.number, "A");

    let err = repo
        .single::<Invoice>(Field::new("amount").eq(2), false)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MultipleMatches { .. }));
}

#[tokio::test]
async fn delete_many_soft_deletes_every_match_across_batches() {
    let repo = repo();
    for index in 0..120 {
        let mut entity = invoice(&format!("INV-{index}"), index);
        if index < 110 {
            entity.batch = "bulk".to_string();
        }
        repo.add(&mut entity).await.unwrap();
    }

    let deleted = repo
        .delete_many::<Invoice>(Field::new("batch").eq("bulk"))
        .await
        .unwrap();
    assert_eq!(deleted, 110);
    assert_eq!(repo.count::<Invoice>(Filter::All, false).await.unwrap(), 10);
    assert_eq!(repo.count::<Invoice>(Filter::All, true).await.unwrap(), 120);
}

#[tokio::test]
async fn delete_many_honours_custom_batch_size_and_includes_tombstones() {
    let repo = repo().with_delete_batch_size(7);
    assert_eq!(repo.delete_batch_size(), 7);

    let mut ids = Vec::new();
    for index in 0..30 {
        ids.push(repo.add(&mut invoice("INV", index)).await.unwrap());
    }
    repo.delete::<Invoice>(ids[0]).await.unwrap();

    let deleted = repo
        .delete_many::<Invoice>(Field::new("number").eq("INV"))
        .await
        .unwrap();
    assert_eq!(deleted, 30);
    assert!(!repo.any::<Invoice>(Filter::All, false).await.unwrap());
}

#[tokio::test]
async fn delete_many_without_matches_returns_zero() {
    let repo = repo();
    repo.add(&mut invoice("INV-1", 1)).await.unwrap();

    let deleted = repo
        .delete_many::<Invoice>(Field::new("amount").gt(1_000))
        .await
        .unwrap();
    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn hard_deletes_remove_records_and_tolerate_zero_matches() {
    let repo = repo();
    let mut single = invoice("INV-1", 1);
    repo.add(&mut single).await.unwrap();
    for index in 0..60 {
        let mut entity = invoice("bulk", index);
        entity.batch = "purge".to_string();
        repo.add(&mut entity).await.unwrap();
    }
    repo.delete_many::<Invoice>(Field::new("batch").eq("purge"))
        .await
        .unwrap();

    let removed = repo
        .delete_hard_many::<Invoice>(Field::new("batch").eq("purge"))
        .await
        .unwrap();
    assert_eq!(removed, 60);

    assert!(repo.delete_hard::<Invoice>(single.id()).await.unwrap());
    assert!(repo.get::<Invoice>(single.id()).await.unwrap().is_none());

    assert!(repo.delete_hard::<Invoice>(single.id()).await.unwrap());
    assert_eq!(
        repo.delete_hard_many::<Invoice>(Filter::All).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn collections_are_separated_per_entity_type() {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Customer {
        #[serde(flatten)]
        meta: EntityMeta,
        name: String,
    }

    impl Entity for Customer {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    let repo = repo();
    repo.add(&mut invoice("INV-1", 1)).await.unwrap();
    let mut customer = Customer {
        meta: EntityMeta::default(),
        name: "acme".to_string(),
    };
    let customer_id = repo.add(&mut customer).await.unwrap();

    assert_eq!(repo.count::<Customer>(Filter::All, false).await.unwrap(), 1);
    assert_eq!(repo.count::<Invoice>(Filter::All, false).await.unwrap(), 1);
    assert!(repo.get::<Invoice>(customer_id).await.unwrap().is_none());
}

#[tokio::test]
async fn open_with_file_settings_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let settings = docrepo_core::StoreSettings::new(
        dir.path().join("data").to_str().unwrap(),
        "ledger",
    )
    .with_delete_batch_size(3);

    let id = {
        let repo = Repository::open(&settings).unwrap();
        assert_eq!(repo.delete_batch_size(), 3);
        repo.add(&mut invoice("INV-1", 42)).await.unwrap()
    };

    let reopened = Repository::open(&settings).unwrap();
    let loaded: Invoice = reopened.get(id).await.unwrap().unwrap();
    assert_eq!(loaded.amount, 42);
    assert!(dir.path().join("data").join("ledger.sqlite3").exists());
}

#[test]
fn open_rejects_incomplete_settings() {
    let settings = docrepo_core::StoreSettings::new("", "ledger");
    let err = Repository::open(&settings).err().unwrap();
    assert!(matches!(err, StoreError::Configuration(_)));
}

#[tokio::test]
async fn entity_kinds_cannot_resolve_to_the_key_value_collection() {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Keys {
        #[serde(flatten)]
        meta: EntityMeta,
        name: String,
    }

    impl Entity for Keys {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }
    }

    let repo = repo();
    repo.key_values()
        .set("theme", &"dark".to_string())
        .await
        .unwrap();

    let mut entity = Keys {
        meta: EntityMeta::default(),
        name: "clash".to_string(),
    };
    let rejected = |err: StoreError| {
        matches!(
            err,
            StoreError::Storage(DbError::InvalidCollectionName(ref name)) if name == "Keys"
        )
    };
    assert!(rejected(repo.add(&mut entity).await.unwrap_err()));
    assert!(rejected(
        repo.count::<Keys>(Filter::All, true).await.unwrap_err()
    ));
    assert!(rejected(
        repo.find::<Keys>(Filter::All, true).await.unwrap_err()
    ));
    assert!(rejected(
        repo.delete_hard_many::<Keys>(Filter::All).await.unwrap_err()
    ));
    assert!(rejected(
        repo.query::<Keys>(true).any().await.unwrap_err()
    ));

    assert_eq!(
        repo.key_values().get::<String>("theme").await.unwrap(),
        "dark"
    );
}
