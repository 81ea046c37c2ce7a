#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::checkin::{CheckInRequest, PointsPolicy, check_in};
    use crate::feed::ChangeFeed;
    use crate::roster::{LiveRoster, Refresh, RosterView, ranked};
    use crate::store::{MemoryStore, SharedStore};
    use crate::test::test_utils::{create_standard_test_db, init_test_logging};

    async fn arrive(store: &SharedStore, name: &str, email: &str) {
        check_in(
            store.as_ref(),
            &PointsPolicy::default(),
            "AB12CD34",
            &CheckInRequest::new(name, email, None),
        )
        .await
        .expect("check-in succeeds");
    }

    #[rocket::async_test]
    async fn test_panel_prepends_new_arrivals() {
        let test_db = create_standard_test_db().await;
        let store = test_db.store.clone();
        let session_id = test_db.session_id("AB12CD34").unwrap();

        arrive(&store, "Student A", "a@x.edu").await;
        let mut roster = LiveRoster::open(store.clone(), session_id, RosterView::Panel)
            .await
            .unwrap();
        assert_eq!(roster.records().len(), 1);

        arrive(&store, "Student B", "b@x.edu").await;
        assert_eq!(roster.next_change().await.unwrap(), Some(Refresh::Prepended));

        let names: Vec<&str> = roster
            .records()
            .iter()
            .map(|r| r.student_name.as_str())
            .collect();
        assert_eq!(names, vec!["Student B", "Student A"]);
    }

    #[rocket::async_test]
    async fn test_leaderboard_reloads_in_rank_order() {
        let test_db = create_standard_test_db().await;
        let store = test_db.store.clone();
        let session_id = test_db.session_id("AB12CD34").unwrap();

        let mut roster = LiveRoster::open(store.clone(), session_id, RosterView::Leaderboard)
            .await
            .unwrap();
        assert!(roster.records().is_empty());

        arrive(&store, "Student A", "a@x.edu").await;
        arrive(&store, "Student B", "b@x.edu").await;
        assert_eq!(roster.try_sync().await.unwrap(), 2);

        let first = roster.records()[0].id;
        store.update_attendance_points(roster.records()[1].id, 150).await.unwrap();
        assert_eq!(roster.next_change().await.unwrap(), Some(Refresh::Reloaded));

        let entries = ranked(roster.records());
        assert_eq!(entries[0].record.student_name, "Student B");
        assert_eq!(entries[0].record.points, 150);
        assert_eq!(entries[0].label, "1st");
        assert_eq!(entries[1].record.id, first);
        assert_eq!(entries[1].label, "2nd");
    }

    #[rocket::async_test]
    async fn test_panel_reloads_on_points_update() {
        let test_db = create_standard_test_db().await;
        let store = test_db.store.clone();
        let session_id = test_db.session_id("AB12CD34").unwrap();

        arrive(&store, "Student A", "a@x.edu").await;
        let mut roster = LiveRoster::open(store.clone(), session_id, RosterView::Panel)
            .await
            .unwrap();

        let id = roster.records()[0].id;
        store.update_attendance_points(id, 5).await.unwrap();
        assert_eq!(roster.next_change().await.unwrap(), Some(Refresh::Reloaded));
        assert_eq!(roster.records()[0].points, 5);
    }

    #[rocket::async_test]
    async fn test_other_sessions_are_filtered_out() {
        let test_db = create_standard_test_db().await;
        let store = test_db.store.clone();
        let old_session = test_db.session_id("WEEK2AAA").unwrap();

        let mut roster = LiveRoster::open(store.clone(), old_session, RosterView::Panel)
            .await
            .unwrap();
        assert_eq!(roster.records().len(), 2);

        arrive(&store, "Student A", "a@x.edu").await;
        assert_eq!(roster.try_sync().await.unwrap(), 0);
        assert_eq!(roster.records().len(), 2);
    }

    #[rocket::async_test]
    async fn test_change_seen_in_snapshot_is_not_duplicated() {
        let test_db = create_standard_test_db().await;
        let store = test_db.store.clone();
        let session_id = test_db.session_id("AB12CD34").unwrap();

        let mut roster = LiveRoster::open(store.clone(), session_id, RosterView::Panel)
            .await
            .unwrap();
        arrive(&store, "Student A", "a@x.edu").await;

        // The row is already in the snapshot when its notification arrives.
        roster.reload().await.unwrap();
        assert_eq!(roster.next_change().await.unwrap(), Some(Refresh::Unchanged));
        assert_eq!(roster.records().len(), 1);
    }

    #[rocket::async_test]
    async fn test_closing_roster_releases_subscription() {
        init_test_logging();
        let feed = ChangeFeed::default();
        let store: SharedStore = Arc::new(MemoryStore::new(feed.clone()));
        let session = store.create_session(3, "CSS Flexbox", "AB12CD34").await.unwrap();

        let first = LiveRoster::open(store.clone(), session.id, RosterView::Panel)
            .await
            .unwrap();
        let second = LiveRoster::open(store.clone(), session.id, RosterView::Leaderboard)
            .await
            .unwrap();
        assert_eq!(feed.receiver_count(), 2);

        first.close();
        assert_eq!(feed.receiver_count(), 1);

        drop(second);
        assert_eq!(feed.receiver_count(), 0);

        // Publishing with nobody listening is not an error.
        arrive(&store, "Student A", "a@x.edu").await;
        assert_eq!(store.count_attendance(session.id).await.unwrap(), 1);
    }
}
