//! Integrationstests fuer das UserRepository (In-Memory SQLite)

use sprechfunk_core::Role;
use sprechfunk_db::{SqliteDb, UserRepository};

#[tokio::test]
async fn benutzer_erstellen_und_laden() {
    let db = SqliteDb::in_memory().await.unwrap();

    let alice = db
        .create_user("alice", Role::User, Some("hash-alice"))
        .await
        .unwrap();
    assert!(alice.id >= 1);

    let per_name = db.get_user_by_username("alice").await.unwrap().unwrap();
    assert_eq!(per_name.id, alice.id);
    assert_eq!(per_name.role, Role::User);

    let per_id = db.get_user_by_id(alice.id).await.unwrap().unwrap();
    assert_eq!(per_id.username, "alice");

    assert!(db.get_user_by_username("bob").await.unwrap().is_none());
}

#[tokio::test]
async fn benutzername_ist_eindeutig() {
    let db = SqliteDb::in_memory().await.unwrap();
    db.create_user("carol", Role::User, None).await.unwrap();

    let result = db.create_user("carol", Role::Admin, None).await;
    assert!(matches!(result, Err(e) if e.ist_eindeutigkeit()));
}

#[tokio::test]
async fn suche_per_personal_token_hash() {
    let db = SqliteDb::in_memory().await.unwrap();
    let dave = db
        .create_user("dave", Role::Moderator, Some("hash-dave"))
        .await
        .unwrap();
    // Benutzer ohne Personal-Token (Alt-Bestand)
    db.create_user("erin", Role::User, None).await.unwrap();

    let treffer = db
        .get_user_by_personal_token_hash("hash-dave")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(treffer.id, dave.id);
    assert_eq!(treffer.role, Role::Moderator);

    assert!(db
        .get_user_by_personal_token_hash("hash-unbekannt")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn rolle_aktualisieren() {
    let db = SqliteDb::in_memory().await.unwrap();
    let frank = db.create_user("frank", Role::User, None).await.unwrap();

    db.update_user_role(frank.id, Role::Admin).await.unwrap();
    let geladen = db.get_user_by_id(frank.id).await.unwrap().unwrap();
    assert_eq!(geladen.role, Role::Admin);

    // Unbekannte ID ist ein Fehler, kein stilles Nichtstun
    assert!(db.update_user_role(9999, Role::User).await.is_err());
}

#[tokio::test]
async fn benutzer_liste_nach_id_sortiert() {
    let db = SqliteDb::in_memory().await.unwrap();
    db.create_user("u1", Role::User, None).await.unwrap();
    db.create_user("u2", Role::User, None).await.unwrap();
    db.create_user("u3", Role::Admin, None).await.unwrap();

    let liste = db.list_users().await.unwrap();
    assert_eq!(liste.len(), 3);
    assert!(liste.windows(2).all(|w| w[0].id < w[1].id));
}
