#[cfg(test)]
pub mod test_db {
    use crate::config::ClassroomConfig;
    use crate::db::{create_artifact, create_session, end_session, insert_attendance};
    use crate::error::AppError;
    use crate::feed::ChangeFeed;
    use crate::models::{ArtifactFields, ArtifactKind, NewArtifact, NewAttendance};
    use crate::store::{MemoryStore, SharedStore, SqliteStore};
    use rocket::local::asynchronous::Client;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::{Arc, Once};

    static INIT: Once = Once::new();

    pub fn init_test_logging() {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .parse_filters("debug")
                .is_test(true)
                .try_init();
        });
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        sessions: Vec<TestSession>,
        attendance: Vec<TestAttendance>,
        artifacts: Vec<TestArtifact>,
    }

    pub struct TestSession {
        pub code: String,
        pub week_number: i64,
        pub title: String,
        pub ended: bool,
    }

    pub struct TestAttendance {
        pub session_code: String,
        pub name: String,
        pub email: String,
        pub points: i64,
    }

    pub struct TestArtifact {
        pub kind: ArtifactKind,
        pub title: String,
        pub week_number: Option<i64>,
        pub student_name: Option<String>,
        pub student_email: Option<String>,
        pub fields: ArtifactFields,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        /// Sessions are created in order; each one ends the session before it.
        pub fn session(mut self, code: &str, week_number: i64, title: &str) -> Self {
            self.sessions.push(TestSession {
                code: code.to_string(),
                week_number,
                title: title.to_string(),
                ended: false,
            });
            self
        }

        pub fn ended_session(mut self, code: &str, week_number: i64, title: &str) -> Self {
            self.sessions.push(TestSession {
                code: code.to_string(),
                week_number,
                title: title.to_string(),
                ended: true,
            });
            self
        }

        pub fn attendance(mut self, session_code: &str, name: &str, email: &str, points: i64) -> Self {
            self.attendance.push(TestAttendance {
                session_code: session_code.to_string(),
                name: name.to_string(),
                email: email.to_string(),
                points,
            });
            self
        }

        pub fn example(mut self, title: &str, week_number: i64, fields: ArtifactFields) -> Self {
            self.artifacts.push(TestArtifact {
                kind: ArtifactKind::Example,
                title: title.to_string(),
                week_number: Some(week_number),
                student_name: None,
                student_email: None,
                fields,
            });
            self
        }

        pub fn student_save(
            mut self,
            title: &str,
            name: &str,
            email: &str,
            fields: ArtifactFields,
        ) -> Self {
            self.artifacts.push(TestArtifact {
                kind: ArtifactKind::StudentSave,
                title: title.to_string(),
                week_number: None,
                student_name: Some(name.to_string()),
                student_email: Some(email.to_string()),
                fields,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            init_test_logging();

            // One connection keeps every query on the same in-memory database.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut session_id_map: HashMap<String, i64> = HashMap::new();
            let mut artifact_id_map: HashMap<String, i64> = HashMap::new();

            for session in &self.sessions {
                let created =
                    create_session(&pool, session.week_number, &session.title, &session.code)
                        .await?;
                if session.ended {
                    end_session(&pool, created.id).await?;
                }
                session_id_map.insert(session.code.clone(), created.id);
            }

            for attendance in &self.attendance {
                let Some(session_id) = session_id_map.get(&attendance.session_code).copied()
                else {
                    continue;
                };
                insert_attendance(
                    &pool,
                    &NewAttendance {
                        session_id,
                        student_name: attendance.name.clone(),
                        student_email: attendance.email.to_lowercase(),
                        student_id: None,
                        points: attendance.points,
                    },
                )
                .await?;
            }

            for artifact in &self.artifacts {
                let created = create_artifact(
                    &pool,
                    &NewArtifact {
                        kind: artifact.kind,
                        title: artifact.title.clone(),
                        description: String::new(),
                        week_number: artifact.week_number,
                        is_starter: false,
                        order_index: 0,
                        student_name: artifact.student_name.clone(),
                        student_email: artifact.student_email.clone(),
                        forked_from: None,
                        fields: artifact.fields.clone(),
                    },
                )
                .await?;
                artifact_id_map.insert(artifact.title.clone(), created.id);
            }

            let store: SharedStore = Arc::new(SqliteStore::new(pool.clone(), ChangeFeed::default()));

            Ok(TestDb {
                pool,
                store,
                session_id_map,
                artifact_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub store: SharedStore,
        pub session_id_map: HashMap<String, i64>,
        pub artifact_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn session_id(&self, code: &str) -> Option<i64> {
            self.session_id_map.get(code).copied()
        }

        pub fn artifact_id(&self, title: &str) -> Option<i64> {
            self.artifact_id_map.get(title).copied()
        }
    }

    /// Week 3 "CSS Flexbox" running under AB12CD34, with an ended week 2
    /// session that already has two students.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .session("WEEK2AAA", 2, "HTML Forms")
            .attendance("WEEK2AAA", "Grace Hopper", "grace@school.edu", 100)
            .attendance("WEEK2AAA", "Alan Turing", "alan@school.edu", 90)
            .session("AB12CD34", 3, "CSS Flexbox")
            .example(
                "Intro HTML",
                1,
                ArtifactFields::new("<h1>Hello</h1>", "h1 { color: red; }", ""),
            )
            .build()
            .await
            .expect("Failed to build standard test database")
    }

    pub fn memory_store() -> SharedStore {
        init_test_logging();
        Arc::new(MemoryStore::default())
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = crate::init_rocket(test_db.store.clone(), ClassroomConfig::default());
        let client = Client::tracked(rocket)
            .await
            .expect("valid rocket instance");
        (client, test_db)
    }
}
