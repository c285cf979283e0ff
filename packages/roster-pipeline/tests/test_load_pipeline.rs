//! End-to-end load tests
//!
//! Each test writes the four source files into a temp directory, runs the
//! orchestrator against a SQLite store and inspects the collections.
use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use roster_pipeline::{
    EntityKind, EntityState, PipelineConfig, PipelineError, PipelineOrchestrator, RunStatus,
    RunTracker, StagePhase,
};
use roster_storage::{CollectionStore, IndexSpec, SqliteCollectionStore, StorageError};
use serde_json::Value;
use tempfile::TempDir;

const INSTRUCTORS: &str = "\
id,firstName,lastName,age,email,specialty
PRF001,Ana,Pérez,41,ana@school.edu,Mathematics
PRF002,Luis,Gómez,39,luis@school.edu,Physics
";

const COURSES: &str = "\
id,name,description,duration,level,startDate,endDate,instructorId,maxCapacity
CUR001,Algebra,Linear equations,6 months,basic,2024-01-10,2024-06-30,PRF001,30
CUR002,Mechanics,Newtonian motion,4 months,intermediate,2024-02-01,2024-05-31,PRF002,25
";

const LEARNERS: &str = "\
id,identificationType,identificationNumber,firstName,lastName,age,email,registrationDate,courseIds
EST001,CC,1001,Sofía,Ramírez,19,sofia@school.edu,2024-01-05,\"CUR001,CUR002\"
EST002,TI,1002,Mateo,Torres,17,mateo@school.edu,2024-01-06,CUR001
";

const SCHEDULE: &str = "\
id,courseId,instructorId,day,startTime,endTime,room,startDate,endDate,maxCapacity
HOR001,CUR001,PRF001,Monday,08:00,10:00,A101,2024-01-10,2024-06-30,30
HOR002,CUR002,PRF002,Monday,10:00,12:00,A101,2024-02-01,2024-05-31,25
";

struct Fixture {
    _dir: TempDir,
    config: PipelineConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = PipelineConfig::default();
        config.sources.dir = dir.path().to_path_buf();
        config.store.path = dir.path().join("roster.db");

        let fixture = Self { _dir: dir, config };
        fixture.write(EntityKind::Instructor, INSTRUCTORS);
        fixture.write(EntityKind::Course, COURSES);
        fixture.write(EntityKind::Learner, LEARNERS);
        fixture.write(EntityKind::ScheduleSlot, SCHEDULE);
        fixture
    }

    fn write(&self, kind: EntityKind, contents: &str) {
        std::fs::write(self.config.sources.path_for(kind), contents).unwrap();
    }

    fn db_path(&self) -> &Path {
        &self.config.store.path
    }

    fn orchestrator(&self) -> PipelineOrchestrator {
        PipelineOrchestrator::new(self.config.clone()).unwrap()
    }
}

async fn ids(store: &dyn CollectionStore, collection: &str) -> Vec<String> {
    store
        .find_all(collection)
        .await
        .unwrap()
        .iter()
        .map(|doc| doc["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_full_load() {
    let fixture = Fixture::new();
    let summary = fixture.orchestrator().run().await.unwrap();

    assert_eq!(summary.status, RunStatus::Done);
    for name in ["instructors", "courses", "learners", "schedule_slots"] {
        let report = summary.collection(name).unwrap();
        assert_eq!(report.documents_loaded, 2, "{name}");
        assert_eq!(report.rejected, 0, "{name}");
    }

    let store = SqliteCollectionStore::open(fixture.db_path()).unwrap();
    let learners = store.find_all("learners").await.unwrap();
    assert_eq!(learners[0]["courseIds"], serde_json::json!(["CUR001", "CUR002"]));
    assert_eq!(learners[0]["overallAverage"], 0.0);
    assert_eq!(learners[0]["registrationDate"], "2024-01-05");

    let indexes: BTreeSet<String> = store
        .list_indexes("schedule_slots")
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert!(indexes.contains("schedule_slots_room_slot_unique"));
    assert_eq!(indexes.len(), 5);
}

#[tokio::test]
async fn test_overlapping_slot_is_rejected() {
    let fixture = Fixture::new();
    fixture.write(
        EntityKind::ScheduleSlot,
        "id,courseId,instructorId,day,startTime,endTime,room,startDate,endDate,maxCapacity
HOR001,CUR001,PRF001,Monday,08:00,10:00,A101,2024-01-10,2024-06-30,30
HOR002,CUR002,PRF002,Monday,09:00,11:00,A101,2024-02-01,2024-05-31,25
",
    );

    let summary = fixture.orchestrator().run().await.unwrap();
    let slots = summary.collection("schedule_slots").unwrap();
    assert_eq!(slots.documents_loaded, 1);
    assert_eq!(slots.rejected, 1);

    let store = SqliteCollectionStore::open(fixture.db_path()).unwrap();
    assert_eq!(ids(&store, "schedule_slots").await, vec!["HOR001"]);
}

#[tokio::test]
async fn test_inverted_course_dates_are_rejected() {
    let fixture = Fixture::new();
    fixture.write(
        EntityKind::Course,
        "id,name,description,duration,level,startDate,endDate,instructorId,maxCapacity
CUR001,Algebra,Linear equations,6 months,basic,2024-07-01,2024-01-01,PRF001,30
CUR002,Mechanics,Newtonian motion,4 months,intermediate,2024-02-01,2024-05-31,PRF002,25
",
    );

    let summary = fixture.orchestrator().run().await.unwrap();
    let courses = summary.collection("courses").unwrap();
    assert_eq!(courses.documents_loaded, 1);
    assert_eq!(courses.rejected, 1);

    // Dependents of the rejected course fail their reference checks
    assert_eq!(summary.collection("learners").unwrap().documents_loaded, 0);
    assert_eq!(summary.collection("schedule_slots").unwrap().documents_loaded, 1);
}

#[tokio::test]
async fn test_underage_learner_is_rejected() {
    let fixture = Fixture::new();
    fixture.write(
        EntityKind::Learner,
        "id,identificationType,identificationNumber,firstName,lastName,age,email,registrationDate
EST001,CC,1001,Sofía,Ramírez,15,sofia@school.edu,2024-01-05
",
    );

    let summary = fixture.orchestrator().run().await.unwrap();
    let learners = summary.collection("learners").unwrap();
    assert_eq!(learners.documents_loaded, 0);
    assert_eq!(learners.rejected, 1);
}

#[tokio::test]
async fn test_ten_learners_load_exactly() {
    let fixture = Fixture::new();
    let mut source = String::from(
        "id,identificationType,identificationNumber,firstName,lastName,age,email,registrationDate\n",
    );
    for i in 1..=10 {
        source.push_str(&format!(
            "EST{i:03},CC,{},Learner,Number{i},{},learner{i}@school.edu,2024-01-05\n",
            2000 + i,
            17 + i
        ));
    }
    fixture.write(EntityKind::Learner, &source);

    let summary = fixture.orchestrator().run().await.unwrap();
    let learners = summary.collection("learners").unwrap();
    assert_eq!(learners.documents_loaded, 10);
    assert_eq!(learners.rejected, 0);

    let store = SqliteCollectionStore::open(fixture.db_path()).unwrap();
    let expected: Vec<String> = (1..=10).map(|i| format!("EST{i:03}")).collect();
    assert_eq!(ids(&store, "learners").await, expected);
}

#[tokio::test]
async fn test_header_only_source_empties_collection() {
    let fixture = Fixture::new();
    fixture.orchestrator().run().await.unwrap();

    fixture.write(
        EntityKind::ScheduleSlot,
        "id,courseId,instructorId,day,startTime,endTime,room,startDate,endDate,maxCapacity\n",
    );
    let summary = fixture.orchestrator().run().await.unwrap();

    assert_eq!(summary.status, RunStatus::Done);
    assert_eq!(summary.collection("schedule_slots").unwrap().documents_loaded, 0);
    let store = SqliteCollectionStore::open(fixture.db_path()).unwrap();
    assert_eq!(store.count("schedule_slots").await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_instructor_id_never_reaches_store() {
    let fixture = Fixture::new();
    fixture.write(
        EntityKind::Instructor,
        "id,firstName,lastName,age,email,specialty
PRF001,Ana,Pérez,41,ana@school.edu,Mathematics
PRF001,Luis,Gómez,39,luis@school.edu,Physics
PRF002,Marta,Ruiz,45,marta@school.edu,Physics
",
    );

    let summary = fixture.orchestrator().run().await.unwrap();
    let instructors = summary.collection("instructors").unwrap();
    assert_eq!(instructors.documents_loaded, 2);
    assert_eq!(instructors.rejected, 1);

    let store = SqliteCollectionStore::open(fixture.db_path()).unwrap();
    let docs = store.find_all("instructors").await.unwrap();
    assert_eq!(docs[0]["firstName"], "Ana");
    assert_eq!(docs[1]["id"], "PRF002");
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let fixture = Fixture::new();

    let first = fixture.orchestrator().run().await.unwrap();
    let store = SqliteCollectionStore::open(fixture.db_path()).unwrap();
    let mut before: Vec<Vec<Value>> = Vec::new();
    for kind in EntityKind::ALL {
        before.push(store.find_all(kind.collection()).await.unwrap());
    }
    store.close().unwrap();

    let second = fixture.orchestrator().run().await.unwrap();
    let store = SqliteCollectionStore::open(fixture.db_path()).unwrap();
    for (kind, docs) in EntityKind::ALL.iter().zip(before) {
        assert_eq!(store.find_all(kind.collection()).await.unwrap(), docs);
    }

    let counts = |s: &roster_pipeline::RunSummary| -> Vec<(usize, usize)> {
        s.collections
            .iter()
            .map(|c| (c.documents_loaded, c.rejected))
            .collect()
    };
    assert_eq!(counts(&first), counts(&second));
}

#[tokio::test]
async fn test_stale_records_do_not_survive() {
    let fixture = Fixture::new();
    fixture.orchestrator().run().await.unwrap();

    fixture.write(
        EntityKind::Instructor,
        "id,firstName,lastName,age,email,specialty
PRF001,Ana,Pérez,41,ana@school.edu,Mathematics
PRF002,Luis,Gómez,39,luis@school.edu,Physics
PRF003,Marta,Ruiz,45,marta@school.edu,Chemistry
",
    );
    fixture.orchestrator().run().await.unwrap();

    fixture.write(
        EntityKind::Instructor,
        "id,firstName,lastName,age,email,specialty
PRF001,Ana,Pérez,41,ana@school.edu,Mathematics
PRF002,Luis,Gómez,39,luis@school.edu,Physics
",
    );
    fixture.orchestrator().run().await.unwrap();

    let store = SqliteCollectionStore::open(fixture.db_path()).unwrap();
    assert_eq!(ids(&store, "instructors").await, vec!["PRF001", "PRF002"]);
}

#[tokio::test]
async fn test_one_bad_row_among_many() {
    let fixture = Fixture::new();
    fixture.write(
        EntityKind::Instructor,
        "id,firstName,lastName,age,email,specialty
PRF001,Ana,Pérez,41,ana@school.edu,Mathematics
PRF002,Luis,Gómez,39,luis@school.edu,Physics
PRF003,Marta,Ruiz,forty,marta@school.edu,Chemistry
PRF004,Jorge,Díaz,50,jorge@school.edu,Biology
PRF005,Elena,Vega,33,elena@school.edu,History
",
    );

    let summary = fixture.orchestrator().run().await.unwrap();
    let instructors = summary.collection("instructors").unwrap();
    assert_eq!(instructors.documents_loaded, 4);
    assert_eq!(instructors.rejected, 1);
    assert_eq!(summary.status, RunStatus::Done);
}

/// Shared buffer the fmt layer writes into
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).lines().map(str::to_string).collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_rejected_record_logs_one_warning_with_its_id() {
    let fixture = Fixture::new();
    fixture.write(
        EntityKind::Instructor,
        "id,firstName,lastName,age,email,specialty
PRF001,Ana,Pérez,41,ana@school.edu,Mathematics
PRF002,Luis,Gómez,39,luis@school.edu,Physics
PRF003,Marta,Ruiz,forty,marta@school.edu,Chemistry
",
    );

    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let summary = fixture.orchestrator().run().await.unwrap();
    assert_eq!(summary.collection("instructors").unwrap().rejected, 1);

    let rejections: Vec<String> = logs
        .lines()
        .into_iter()
        .filter(|line| line.contains("Rejected record"))
        .collect();
    assert_eq!(rejections.len(), 1, "{rejections:?}");
    let warning = &rejections[0];
    assert!(warning.contains("WARN"), "{warning}");
    assert!(warning.contains("PRF003"), "{warning}");
    assert!(warning.contains("age"), "{warning}");
}

#[tokio::test]
async fn test_spanish_headers_and_spellings() {
    let fixture = Fixture::new();
    fixture.write(
        EntityKind::Course,
        "id,nombre,descripcion,duracion,nivel,fechaInicio,fechaFin,profesorId,capacidadMaxima,horario
CUR001,Álgebra,Ecuaciones,6 meses,Básico,2024-01-10,2024-06-30,PRF001,30,\"[{\"\"dia\"\": \"\"lunes\"\", \"\"horaInicio\"\": \"\"08:00\"\", \"\"horaFin\"\": \"\"10:00\"\"}]\"
CUR002,Mecánica,Movimiento,4 meses,Intermedio,2024-02-01,2024-05-31,PRF002,25,
",
    );

    let summary = fixture.orchestrator().run().await.unwrap();
    assert_eq!(summary.collection("courses").unwrap().documents_loaded, 2);

    let store = SqliteCollectionStore::open(fixture.db_path()).unwrap();
    let courses = store.find_all("courses").await.unwrap();
    assert_eq!(courses[0]["level"], "basic");
    assert_eq!(courses[0]["schedule"][0]["day"], "Monday");
    assert_eq!(courses[0]["schedule"][0]["startTime"], "08:00");
    assert_eq!(courses[1]["level"], "intermediate");
}

#[tokio::test]
async fn test_missing_source_aborts_run() {
    let fixture = Fixture::new();
    std::fs::remove_file(fixture.config.sources.path_for(EntityKind::Learner)).unwrap();

    let err = fixture.orchestrator().run().await.unwrap_err();
    assert_eq!(
        err.stage(),
        Some((EntityKind::Learner, StagePhase::Extracting))
    );
    assert!(matches!(err.root(), PipelineError::Parse { .. }));

    // Earlier collections stay loaded; later ones were never attempted
    let store = SqliteCollectionStore::open(fixture.db_path()).unwrap();
    assert_eq!(store.count("courses").await.unwrap(), 2);
    assert_eq!(store.count("schedule_slots").await.unwrap(), 0);
}

/// Delegates to SQLite but refuses bulk inserts into one collection
struct RefusingStore {
    inner: SqliteCollectionStore,
    refuse: &'static str,
}

#[async_trait]
impl CollectionStore for RefusingStore {
    async fn truncate(&self, collection: &str) -> roster_storage::Result<usize> {
        self.inner.truncate(collection).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: &[Value],
    ) -> roster_storage::Result<usize> {
        if collection == self.refuse {
            return Err(StorageError::connection("connection reset by peer"));
        }
        self.inner.insert_many(collection, documents).await
    }

    async fn list_indexes(&self, collection: &str) -> roster_storage::Result<Vec<String>> {
        self.inner.list_indexes(collection).await
    }

    async fn drop_index(&self, collection: &str, name: &str) -> roster_storage::Result<bool> {
        self.inner.drop_index(collection, name).await
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> roster_storage::Result<()> {
        self.inner.create_index(collection, spec).await
    }

    async fn field_values(
        &self,
        collection: &str,
        field: &str,
    ) -> roster_storage::Result<BTreeSet<String>> {
        self.inner.field_values(collection, field).await
    }

    async fn find_all(&self, collection: &str) -> roster_storage::Result<Vec<Value>> {
        self.inner.find_all(collection).await
    }

    async fn count(&self, collection: &str) -> roster_storage::Result<usize> {
        self.inner.count(collection).await
    }
}

#[tokio::test]
async fn test_store_write_failure_is_fatal() {
    let fixture = Fixture::new();
    let store = RefusingStore {
        inner: SqliteCollectionStore::in_memory().unwrap(),
        refuse: "courses",
    };

    let mut tracker = RunTracker::new();
    let err = fixture
        .orchestrator()
        .execute(&store, &mut tracker)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some((EntityKind::Course, StagePhase::Loading)));
    assert!(matches!(err.root(), PipelineError::StoreWrite { .. }));
    assert!(err.to_string().contains("connection reset by peer"));

    assert!(matches!(
        tracker.state(EntityKind::Instructor),
        EntityState::Done { .. }
    ));
    assert!(matches!(
        tracker.state(EntityKind::Course),
        EntityState::Failed {
            phase: StagePhase::Loading,
            ..
        }
    ));
    assert_eq!(tracker.state(EntityKind::Learner), &EntityState::Idle);
    assert_eq!(tracker.state(EntityKind::ScheduleSlot), &EntityState::Idle);
    assert_eq!(tracker.status(), RunStatus::Failed);

    // Truncated, never half-populated
    assert_eq!(store.count("courses").await.unwrap(), 0);
}
