//! Integration tests for the inventory ledger, catalog and users

mod helpers;

use helpers::*;
use kinstone_common::db::{Half, Provenance, Rarity};
use kinstone_common::{Error, ErrorKind};
use kinstone_fusion::catalog::{NewPiece, PieceFilter};
use kinstone_fusion::pagination::Page;
use kinstone_fusion::users::{NewUser, UserUpdate};
use tokio::task::JoinSet;
use uuid::Uuid;

#[tokio::test]
async fn test_add_entry_fills_to_capacity() {
    let ctx = create_test_context().await.unwrap();
    let state = &ctx.state;
    let user = create_user(state, 2).await;
    let piece = create_piece(state, "star", Half::A, Rarity::Common).await;

    let first = state
        .ledger
        .add_entry(user, piece, Provenance::Drop)
        .await
        .unwrap();
    let second = state
        .ledger
        .add_entry(user, piece, Provenance::Reward)
        .await
        .unwrap();
    assert!(second.entry.serial_number > first.entry.serial_number);
    assert_eq!(second.entry.provenance, Provenance::Reward);
    assert_eq!(first.piece.shape_family, "star");

    let err = state
        .ledger
        .add_entry(user, piece, Provenance::Drop)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded(_)));

    assert_eq!(current_usage(&ctx.pool, user).await, 2);
    assert_eq!(live_entries(&ctx.pool, user).await, 2);
}

#[tokio::test]
async fn test_add_entry_rejects_unknown_or_inactive_piece() {
    let ctx = create_test_context().await.unwrap();
    let state = &ctx.state;
    let user = create_user(state, 5).await;
    let piece = create_piece(state, "star", Half::A, Rarity::Common).await;

    let err = state
        .ledger
        .add_entry(user, Uuid::new_v4(), Provenance::Drop)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    state.catalog.set_piece_active(piece, false).await.unwrap();
    let err = state
        .ledger
        .add_entry(user, piece, Provenance::Drop)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = state
        .ledger
        .add_entry(Uuid::new_v4(), Uuid::new_v4(), Provenance::Drop)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(current_usage(&ctx.pool, user).await, 0);
}

#[tokio::test]
async fn test_serial_numbers_never_reused() {
    let ctx = create_test_context().await.unwrap();
    let state = &ctx.state;
    let user = create_user(state, 5).await;
    let piece = create_piece(state, "star", Half::A, Rarity::Common).await;

    let first = state
        .ledger
        .add_entry(user, piece, Provenance::Drop)
        .await
        .unwrap();
    state
        .ledger
        .remove_entries(user, &[first.entry.id])
        .await
        .unwrap();
    let second = state
        .ledger
        .add_entry(user, piece, Provenance::Drop)
        .await
        .unwrap();

    assert!(second.entry.serial_number > first.entry.serial_number);
}

#[tokio::test]
async fn test_remove_entries_is_all_or_nothing() {
    let ctx = create_test_context().await.unwrap();
    let state = &ctx.state;
    let user = create_user(state, 5).await;
    let other = create_user(state, 5).await;
    let piece = create_piece(state, "star", Half::A, Rarity::Common).await;
    let e1 = grant(state, user, piece).await;
    let e2 = grant(state, user, piece).await;
    let foreign = grant(state, other, piece).await;

    // Foreign entry poisons the whole batch
    let err = state
        .ledger
        .remove_entries(user, &[e1, foreign])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(entry_exists(&ctx.pool, e1).await);
    assert!(entry_exists(&ctx.pool, foreign).await);
    assert_eq!(current_usage(&ctx.pool, user).await, 2);

    // So does a locked one
    state
        .ledger
        .set_lock_status(user, &[e2], true)
        .await
        .unwrap();
    let err = state
        .ledger
        .remove_entries(user, &[e1, e2])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(current_usage(&ctx.pool, user).await, 2);

    let removed = state.ledger.remove_entries(user, &[e1]).await.unwrap();
    assert_eq!(removed, vec![e1]);
    assert_eq!(current_usage(&ctx.pool, user).await, 1);
    assert_ledger_balanced(&ctx.pool, user).await;

    let err = state.ledger.remove_entries(user, &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_set_capacity_bounds() {
    let ctx = create_test_context().await.unwrap();
    let state = &ctx.state;
    let user = create_user(state, 5).await;
    let piece = create_piece(state, "star", Half::A, Rarity::Common).await;
    for _ in 0..3 {
        grant(state, user, piece).await;
    }

    let err = state.ledger.set_capacity(user, 2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = state.ledger.set_capacity(user, 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = state.ledger.set_capacity(Uuid::new_v4(), 10).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let inventory = state.ledger.set_capacity(user, 3).await.unwrap();
    assert_eq!(inventory.capacity, 3);
    assert_eq!(inventory.current_usage, 3);

    let err = state
        .ledger
        .add_entry(user, piece, Provenance::Drop)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
}

#[tokio::test]
async fn test_usage_matches_entries_over_mixed_sequence() {
    let ctx = create_test_context().await.unwrap();
    let state = &ctx.state;
    let user = create_user(state, 4).await;
    let piece = create_piece(state, "star", Half::A, Rarity::Common).await;

    // Deterministic add/remove sequence that repeatedly hits the capacity wall
    let mut live: Vec<Uuid> = Vec::new();
    for step in 0..40u32 {
        if step % 3 == 2 && !live.is_empty() {
            let id = live.remove((step as usize) % live.len());
            state.ledger.remove_entries(user, &[id]).await.unwrap();
        } else {
            match state.ledger.add_entry(user, piece, Provenance::Drop).await {
                Ok(added) => live.push(added.entry.id),
                Err(Error::CapacityExceeded(_)) => assert_eq!(live.len(), 4),
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        let usage = current_usage(&ctx.pool, user).await;
        assert_eq!(usage, live.len() as i64, "step {}", step);
        assert!(usage <= 4);
        assert_ledger_balanced(&ctx.pool, user).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_never_exceed_capacity() {
    let ctx = create_test_context().await.unwrap();
    let state = ctx.state.clone();
    let user = create_user(&state, 5).await;
    let piece = create_piece(&state, "star", Half::A, Rarity::Common).await;

    let mut join_set = JoinSet::new();
    for _ in 0..20 {
        let state = state.clone();
        join_set.spawn(async move {
            state
                .ledger
                .add_entry(user, piece, Provenance::Drop)
                .await
        });
    }

    let mut added = 0;
    let mut full = 0;
    while let Some(result) = join_set.join_next().await {
        match result.expect("task panicked") {
            Ok(_) => added += 1,
            Err(Error::CapacityExceeded(_)) => full += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(added, 5);
    assert_eq!(full, 15);
    assert_eq!(current_usage(&ctx.pool, user).await, 5);
    assert_ledger_balanced(&ctx.pool, user).await;
}

#[tokio::test]
async fn test_lock_status_only_touches_owner_entries() {
    let ctx = create_test_context().await.unwrap();
    let state = &ctx.state;
    let user = create_user(state, 5).await;
    let other = create_user(state, 5).await;
    let piece = create_piece(state, "star", Half::A, Rarity::Common).await;
    let mine = grant(state, user, piece).await;
    let theirs = grant(state, other, piece).await;

    let updated = state
        .ledger
        .set_lock_status(user, &[mine, theirs], true)
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let mine = state.ledger.get_entry(user, mine).await.unwrap();
    let theirs = state.ledger.get_entry(other, theirs).await.unwrap();
    assert!(mine.entry.is_locked);
    assert!(!theirs.entry.is_locked);

    let err = state.ledger.get_entry(user, theirs.entry.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_inventory_listing_newest_first() {
    let ctx = create_test_context().await.unwrap();
    let state = &ctx.state;
    let user = create_user(state, 10).await;
    let piece = create_piece(state, "star", Half::A, Rarity::Common).await;
    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(grant(state, user, piece).await);
    }

    let inventory = state.ledger.get_inventory(user, Page::default()).await.unwrap();
    assert_eq!(inventory.inventory.current_usage, 5);
    let listed: Vec<Uuid> = inventory.entries.iter().map(|e| e.entry.id).collect();
    ids.reverse();
    assert_eq!(listed, ids);

    let page = state.ledger.get_inventory(user, Page::new(Some(2), Some(1))).await.unwrap();
    let listed: Vec<Uuid> = page.entries.iter().map(|e| e.entry.id).collect();
    assert_eq!(listed, ids[1..3].to_vec());

    let err = state.ledger.get_inventory(Uuid::new_v4(), Page::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_inventory_stats_and_pairs() {
    let ctx = create_test_context().await.unwrap();
    let state = &ctx.state;
    let user = create_user(state, 10).await;
    let star_a = create_piece(state, "star", Half::A, Rarity::Common).await;
    let star_b = create_piece(state, "star", Half::B, Rarity::Epic).await;
    let moon_a = create_piece(state, "moon", Half::A, Rarity::Rare).await;

    let s1 = grant(state, user, star_a).await;
    let s2 = grant(state, user, star_b).await;
    let s3 = grant(state, user, star_b).await;
    grant(state, user, moon_a).await;

    let stats = state.ledger.stats(user).await.unwrap();
    assert_eq!(stats.capacity, 10);
    assert_eq!(stats.current_usage, 4);
    assert_eq!(stats.available_slots, 6);
    assert_eq!(stats.by_rarity[&Rarity::Common], 1);
    assert_eq!(stats.by_rarity[&Rarity::Epic], 2);
    assert_eq!(stats.by_rarity[&Rarity::Legendary], 0);
    assert_eq!(stats.shape_families, vec!["moon".to_string(), "star".to_string()]);
    assert_eq!(stats.locked_entries, 0);

    let pairs = state.ledger.available_pairs(user).await.unwrap();
    assert_eq!(pairs.len(), 2);
    for pair in &pairs {
        assert_eq!(pair.shape_family, "star");
        assert_eq!(pair.entry_1.entry.id, s1);
        assert_eq!(pair.entry_1.piece.half, Half::A);
        assert!(pair.entry_2.entry.id == s2 || pair.entry_2.entry.id == s3);
    }

    // Locked entries drop out of the candidate set
    state
        .ledger
        .set_lock_status(user, &[s1], true)
        .await
        .unwrap();
    assert!(state.ledger.available_pairs(user).await.unwrap().is_empty());
    assert_eq!(state.ledger.stats(user).await.unwrap().locked_entries, 1);
}

#[tokio::test]
async fn test_create_user_with_inventory() {
    let ctx = create_test_context().await.unwrap();
    let state = &ctx.state;

    let created = state
        .users
        .create_user(NewUser {
            handle: Some("nova".to_string()),
            display_name: Some("Nova".to_string()),
            inventory_capacity: None,
        })
        .await
        .unwrap();
    assert_eq!(created.inventory.capacity, 50);
    assert_eq!(created.inventory.current_usage, 0);
    assert_eq!(created.user.handle.as_deref(), Some("nova"));

    let fetched = state.users.get_user(created.user.id).await.unwrap();
    assert_eq!(fetched, created);

    let err = state
        .users
        .create_user(NewUser {
            handle: Some("nova".to_string()),
            ..NewUser::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = state
        .users
        .create_user(NewUser {
            inventory_capacity: Some(0),
            ..NewUser::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = state.users.get_user(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_update_list_and_deactivate_users() {
    let ctx = create_test_context().await.unwrap();
    let state = &ctx.state;

    let nova = state
        .users
        .create_user(NewUser {
            handle: Some("nova".to_string()),
            ..NewUser::default()
        })
        .await
        .unwrap();
    let vega = state
        .users
        .create_user(NewUser {
            handle: Some("vega".to_string()),
            ..NewUser::default()
        })
        .await
        .unwrap();

    let updated = state
        .users
        .update_user(
            nova.user.id,
            UserUpdate {
                handle: None,
                display_name: Some("Nova Prime".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.user.handle.as_deref(), Some("nova"));
    assert_eq!(updated.user.display_name.as_deref(), Some("Nova Prime"));

    // keeping your own handle is fine, taking another user's is not
    state
        .users
        .update_user(
            nova.user.id,
            UserUpdate {
                handle: Some("nova".to_string()),
                display_name: None,
            },
        )
        .await
        .unwrap();
    let err = state
        .users
        .update_user(
            nova.user.id,
            UserUpdate {
                handle: Some("vega".to_string()),
                display_name: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = state
        .users
        .update_user(nova.user.id, UserUpdate::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let listed = state.users.list_users(Page::default()).await.unwrap();
    let ids: Vec<Uuid> = listed.iter().map(|u| u.user.id).collect();
    assert_eq!(ids, vec![vega.user.id, nova.user.id]);

    let page = state.users.list_users(Page::new(Some(1), Some(1))).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].user.id, nova.user.id);

    state.users.deactivate_user(vega.user.id).await.unwrap();

    let err = state.users.get_user(vega.user.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = state.users.deactivate_user(vega.user.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = state
        .users
        .update_user(
            vega.user.id,
            UserUpdate {
                handle: None,
                display_name: Some("Ghost".to_string()),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let listed = state.users.list_users(Page::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].user.id, nova.user.id);

    // the deactivated user's handle stays reserved
    let err = state
        .users
        .create_user(NewUser {
            handle: Some("vega".to_string()),
            ..NewUser::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_catalog_create_list_and_retire() {
    let ctx = create_test_context().await.unwrap();
    let state = &ctx.state;

    let piece = state
        .catalog
        .create_piece(NewPiece {
            shape_family: "comet".to_string(),
            half: Half::B,
            rarity: None,
            name: "Comet Tail".to_string(),
            description: Some("Trails behind".to_string()),
            tags: vec!["sky".to_string(), "event".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(piece.rarity, Rarity::Common);

    let fetched = state.catalog.get_piece(piece.id).await.unwrap();
    assert_eq!(fetched.tags, vec!["sky".to_string(), "event".to_string()]);
    assert_eq!(fetched.description.as_deref(), Some("Trails behind"));

    create_piece(state, "comet", Half::A, Rarity::Epic).await;
    create_piece(state, "star", Half::A, Rarity::Epic).await;

    let comets = state
        .catalog
        .list_pieces(
            &PieceFilter {
                shape_family: Some("comet".to_string()),
                ..PieceFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(comets.len(), 2);

    let epics = state
        .catalog
        .list_pieces(
            &PieceFilter {
                rarity: Some(Rarity::Epic),
                ..PieceFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(epics.len(), 2);

    // any one matching tag is enough
    let tagged = state
        .catalog
        .list_pieces(
            &PieceFilter {
                tags: vec!["event".to_string(), "holiday".to_string()],
                ..PieceFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].id, piece.id);

    let untagged = state
        .catalog
        .list_pieces(
            &PieceFilter {
                tags: vec!["holiday".to_string()],
                ..PieceFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert!(untagged.is_empty());

    state
        .catalog
        .set_piece_active(piece.id, false)
        .await
        .unwrap();
    let active = state
        .catalog
        .list_pieces(&PieceFilter::default(), Page::default())
        .await
        .unwrap();
    assert_eq!(active.len(), 2);

    let everything = state
        .catalog
        .list_pieces(
            &PieceFilter {
                active_only: false,
                ..PieceFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(everything.len(), 3);

    let err = state
        .catalog
        .create_piece(NewPiece {
            shape_family: "  ".to_string(),
            half: Half::A,
            rarity: None,
            name: "Nameless".to_string(),
            description: None,
            tags: vec![],
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = state.catalog.set_piece_active(Uuid::new_v4(), true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
