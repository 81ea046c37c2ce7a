#[cfg(test)]
mod tests {
    use crate::checkin::{CheckInRequest, PointsPolicy, check_in, resolve_session};
    use crate::error::CheckInError;
    use crate::roster::RosterView;
    use crate::store::SharedStore;
    use crate::test::test_utils::{TestDbBuilder, memory_store};

    async fn stores() -> Vec<(&'static str, SharedStore)> {
        let sqlite = TestDbBuilder::new()
            .build()
            .await
            .expect("Failed to build test database");
        vec![("memory", memory_store()), ("sqlite", sqlite.store)]
    }

    async fn flexbox_session(store: &SharedStore) -> i64 {
        store
            .create_session(3, "CSS Flexbox", "AB12CD34")
            .await
            .expect("Failed to create session")
            .id
    }

    #[rocket::async_test]
    async fn test_flexbox_check_in_sequence() {
        let policy = PointsPolicy::default();

        for (name, store) in stores().await {
            let session_id = flexbox_session(&store).await;

            let first = check_in(
                store.as_ref(),
                &policy,
                "AB12CD34",
                &CheckInRequest::new("Student A", "a@x.edu", None),
            )
            .await
            .expect("first check-in");
            assert_eq!(first.points, 100, "{name}");
            assert_eq!(first.week_number, 3);
            assert_eq!(first.title, "CSS Flexbox");

            let second = check_in(
                store.as_ref(),
                &policy,
                "AB12CD34",
                &CheckInRequest::new("Student B", "b@x.edu", Some("S-2")),
            )
            .await
            .expect("second check-in");
            assert_eq!(second.points, 90, "{name}");
            assert_eq!(second.record.student_id.as_deref(), Some("S-2"));

            let again = check_in(
                store.as_ref(),
                &policy,
                "AB12CD34",
                &CheckInRequest::new("Student A", "a@x.edu", None),
            )
            .await;
            assert!(matches!(again, Err(CheckInError::AlreadyCheckedIn)), "{name}");

            let panel = store
                .list_attendance(session_id, RosterView::Panel)
                .await
                .unwrap();
            assert_eq!(panel.len(), 2, "{name}");
            assert_eq!(panel[0].student_email, "b@x.edu");

            let leaderboard: Vec<(String, i64)> = store
                .list_attendance(session_id, RosterView::Leaderboard)
                .await
                .unwrap()
                .into_iter()
                .map(|r| (r.student_name, r.points))
                .collect();
            assert_eq!(
                leaderboard,
                vec![("Student A".to_string(), 100), ("Student B".to_string(), 90)],
                "{name}"
            );
        }
    }

    #[rocket::async_test]
    async fn test_email_is_case_insensitive() {
        let policy = PointsPolicy::default();

        for (name, store) in stores().await {
            let session_id = flexbox_session(&store).await;

            let first = check_in(
                store.as_ref(),
                &policy,
                "AB12CD34",
                &CheckInRequest::new("Ada", "  Ada@X.edu ", None),
            )
            .await
            .expect("first check-in");
            assert_eq!(first.record.student_email, "ada@x.edu");

            let duplicate = check_in(
                store.as_ref(),
                &policy,
                "AB12CD34",
                &CheckInRequest::new("Ada L.", "ada@x.EDU", None),
            )
            .await;
            assert!(matches!(duplicate, Err(CheckInError::AlreadyCheckedIn)), "{name}");
            assert_eq!(store.count_attendance(session_id).await.unwrap(), 1);
        }
    }

    #[rocket::async_test]
    async fn test_unusable_codes_write_nothing() {
        let policy = PointsPolicy::default();
        let request = CheckInRequest::new("Ada", "ada@x.edu", None);

        for (name, store) in stores().await {
            let session_id = flexbox_session(&store).await;

            for code in ["ZZZZ9999", "short", "", "AB12-CD34"] {
                let result = check_in(store.as_ref(), &policy, code, &request).await;
                assert!(
                    matches!(result, Err(CheckInError::InvalidSession)),
                    "{name}: {code:?}"
                );
            }

            store.end_session(session_id).await.unwrap();
            let ended = check_in(store.as_ref(), &policy, "AB12CD34", &request).await;
            assert!(matches!(ended, Err(CheckInError::InvalidSession)), "{name}");

            assert_eq!(store.count_attendance(session_id).await.unwrap(), 0, "{name}");
        }
    }

    #[rocket::async_test]
    async fn test_code_lookup_ignores_case_and_whitespace() {
        for (name, store) in stores().await {
            let session_id = flexbox_session(&store).await;
            let session = resolve_session(store.as_ref(), " ab12cd34 ")
                .await
                .expect("normalized code resolves");
            assert_eq!(session.id, session_id, "{name}");
        }
    }

    #[rocket::async_test]
    async fn test_invalid_input_writes_nothing() {
        let policy = PointsPolicy::default();

        for (name, store) in stores().await {
            let session_id = flexbox_session(&store).await;

            let no_name = check_in(
                store.as_ref(),
                &policy,
                "AB12CD34",
                &CheckInRequest::new("  ", "ada@x.edu", None),
            )
            .await;
            assert!(
                matches!(&no_name, Err(CheckInError::InvalidInput(reason)) if reason == "Name is required"),
                "{name}"
            );

            let bad_email = check_in(
                store.as_ref(),
                &policy,
                "AB12CD34",
                &CheckInRequest::new("Ada", "ada.x.edu", None),
            )
            .await;
            assert!(
                matches!(&bad_email, Err(CheckInError::InvalidInput(reason)) if reason == "Enter a valid email address"),
                "{name}"
            );

            assert_eq!(store.count_attendance(session_id).await.unwrap(), 0, "{name}");
        }
    }

    #[rocket::async_test]
    async fn test_points_follow_arrival_order_across_failures() {
        let policy = PointsPolicy::default();

        for (name, store) in stores().await {
            flexbox_session(&store).await;

            for k in 0..12i64 {
                // Failed attempts between arrivals must not consume a slot.
                let _ = check_in(
                    store.as_ref(),
                    &policy,
                    "AB12CD34",
                    &CheckInRequest::new("", "nobody@x.edu", None),
                )
                .await;
                if k > 0 {
                    let _ = check_in(
                        store.as_ref(),
                        &policy,
                        "AB12CD34",
                        &CheckInRequest::new("Repeat", "student0@x.edu", None),
                    )
                    .await;
                }

                let receipt = check_in(
                    store.as_ref(),
                    &policy,
                    "AB12CD34",
                    &CheckInRequest::new(&format!("Student {k}"), &format!("student{k}@x.edu"), None),
                )
                .await
                .expect("check-in succeeds");
                assert_eq!(receipt.points, (100 - 10 * k).max(10), "{name}: k={k}");
            }
        }
    }

    #[rocket::async_test]
    async fn test_concurrent_duplicate_check_ins_keep_one_record() {
        let policy = PointsPolicy::default();

        for (name, store) in stores().await {
            let session_id = flexbox_session(&store).await;
            let request = CheckInRequest::new("Ada", "ada@x.edu", None);

            let (left, right) = rocket::tokio::join!(
                check_in(store.as_ref(), &policy, "AB12CD34", &request),
                check_in(store.as_ref(), &policy, "AB12CD34", &request),
            );

            let outcomes = [left, right];
            let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
            let duplicates = outcomes
                .iter()
                .filter(|r| matches!(r, Err(CheckInError::AlreadyCheckedIn)))
                .count();
            assert_eq!((succeeded, duplicates), (1, 1), "{name}");
            assert_eq!(store.count_attendance(session_id).await.unwrap(), 1, "{name}");
        }
    }
}
