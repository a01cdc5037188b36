use praxis_core::Turn;
use praxis_session::{FileSessionStore, SessionManager, SessionManagerConfig, SessionStatus};
use std::sync::Arc;

async fn temp_manager(dir: &std::path::Path) -> Arc<SessionManager> {
    let store = FileSessionStore::new(dir.join("sessions")).await.unwrap();
    Arc::new(SessionManager::new(
        Arc::new(store),
        SessionManagerConfig::default(),
    ))
}

#[tokio::test]
async fn concurrent_appends_serialize_per_id() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = temp_manager(tmp.path()).await;
    let session = mgr.create(None).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let mgr = Arc::clone(&mgr);
        let id = session.id;
        handles.push(tokio::spawn(async move {
            mgr.append_turn(id, Turn::student(format!("reply {i}"), 0))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let final_state = mgr.load(session.id).await.unwrap().unwrap();
    assert_eq!(final_state.turn_count(), 10);
    // Sequence numbers are gap-free and insertion-ordered regardless of
    // which append won each race.
    for (i, turn) in final_state.turns.iter().enumerate() {
        assert_eq!(turn.seq, i as u32);
    }
}

#[tokio::test]
async fn writes_survive_process_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let session_id;
    {
        let mgr = temp_manager(tmp.path()).await;
        let session = mgr.create(None).await.unwrap();
        session_id = session.id;
        mgr.append_turn(session_id, Turn::tutor("scenario", 0))
            .await
            .unwrap();
        mgr.set_status(session_id, SessionStatus::Finished)
            .await
            .unwrap();
    }

    // A brand-new manager over the same directory sees the committed state.
    let mgr2 = temp_manager(tmp.path()).await;
    let loaded = mgr2.load(session_id).await.unwrap().unwrap();
    assert_eq!(loaded.turn_count(), 1);
    assert_eq!(loaded.status, SessionStatus::Finished);
}

#[tokio::test]
async fn closing_turn_is_always_last_despite_racing_appends() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = temp_manager(tmp.path()).await;
    let session = mgr.create(None).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let mgr = Arc::clone(&mgr);
        let id = session.id;
        handles.push(tokio::spawn(async move {
            // Appends racing the close may legitimately lose once the
            // session is finished.
            let _ = mgr.append_turn(id, Turn::student(format!("reply {i}"), 0)).await;
        }));
    }
    let closer = {
        let mgr = Arc::clone(&mgr);
        let id = session.id;
        tokio::spawn(async move {
            mgr.append_turn_and_finish(id, Turn::tutor("closing summary", 0))
                .await
                .unwrap();
        })
    };
    for handle in handles {
        handle.await.unwrap();
    }
    closer.await.unwrap();

    let final_state = mgr.load(session.id).await.unwrap().unwrap();
    assert_eq!(final_state.status, SessionStatus::Finished);
    // No turn slipped in between the closing turn and the status change.
    assert_eq!(
        final_state.turns.last().unwrap().content,
        "closing summary"
    );
    for (i, turn) in final_state.turns.iter().enumerate() {
        assert_eq!(turn.seq, i as u32);
    }
}

#[tokio::test]
async fn last_appended_turn_is_visible_on_load() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = temp_manager(tmp.path()).await;
    let session = mgr.create(None).await.unwrap();

    mgr.append_turn(session.id, Turn::student("content X", 0))
        .await
        .unwrap();

    let loaded = mgr.load(session.id).await.unwrap().unwrap();
    assert_eq!(loaded.turns.last().unwrap().content, "content X");
}

#[tokio::test]
async fn independent_sessions_do_not_block_each_other() {
    let tmp = tempfile::tempdir().unwrap();
    let mgr = temp_manager(tmp.path()).await;
    let a = mgr.create(None).await.unwrap();
    let b = mgr.create(None).await.unwrap();

    let mgr_a = Arc::clone(&mgr);
    let mgr_b = Arc::clone(&mgr);
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { mgr_a.append_turn(a.id, Turn::student("a", 0)).await }),
        tokio::spawn(async move { mgr_b.append_turn(b.id, Turn::student("b", 0)).await }),
    );
    assert!(ra.unwrap().is_ok());
    assert!(rb.unwrap().is_ok());

    let list = mgr.list().await.unwrap();
    assert_eq!(list.len(), 2);
}
