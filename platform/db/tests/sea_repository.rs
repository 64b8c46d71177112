use chrono::NaiveDate;
use migration::{Migrator, MigratorTrait};
use platform_db::{SeaDealRepository, connect, load_companies, load_contacts, seed_pipeline_demo};
use products_crm::{
    CompanyRef, DealFilter, DealPayload, DealQuery, DealRepository, DragEvent, DragOutcome,
    DealsView, NotificationLog, Stage,
};

async fn repository() -> SeaDealRepository {
    let db = connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    SeaDealRepository::new(db)
}

fn payload(name: &str, stage: Stage) -> DealPayload {
    DealPayload {
        name: name.into(),
        value: 1500.0,
        stage,
        expected_close_date: NaiveDate::from_ymd_opt(2031, 3, 15).unwrap(),
        contact_id: 7,
        company_id: Some(3),
        notes: Some("first call went well".into()),
    }
}

#[tokio::test]
async fn create_read_update_delete_round_trip() {
    let repo = repository().await;

    let created = repo.create(payload("Renewal", Stage::Proposal)).await.unwrap();
    assert!(created.id > 0);
    assert_eq!(created.company_id, CompanyRef::Id(3));
    assert_eq!(created.contact_id, Some(7));

    let fetched = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(fetched.name, "Renewal");
    assert_eq!(fetched.stage, Stage::Proposal);
    assert_eq!(fetched.notes.as_deref(), Some("first call went well"));

    let mut edit = payload("Renewal (3y)", Stage::Negotiation);
    edit.company_id = None;
    let updated = repo.update(created.id, edit).await.unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(updated.company_id, CompanyRef::Unresolved);

    assert!(repo.delete(created.id).await.unwrap());
    assert!(!repo.delete(created.id).await.unwrap());
    assert!(repo.get_by_id(created.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn stage_update_persists_and_missing_rows_are_not_found() {
    let repo = repository().await;
    let deal = repo.create(payload("Expansion", Stage::Prospecting)).await.unwrap();

    let moved = repo.update_stage(deal.id, Stage::ClosedWon).await.unwrap();
    assert_eq!(moved.stage, Stage::ClosedWon);
    assert!(moved.updated_at >= deal.updated_at);

    let won = repo.get_by_stage(Stage::ClosedWon).await.unwrap();
    assert_eq!(won.len(), 1);
    assert!(repo.get_by_stage(Stage::Prospecting).await.unwrap().is_empty());

    let err = repo.update_stage(999, Stage::Proposal).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn seeded_data_loads_into_the_view() {
    let repo = repository().await;
    let report = seed_pipeline_demo(repo.connection()).await.unwrap();
    assert_eq!(report.companies, 3);
    assert_eq!(report.deals, 6);
    assert!(seed_pipeline_demo(repo.connection()).await.unwrap().is_empty());

    let contacts = load_contacts(repo.connection()).await.unwrap();
    let companies = load_companies(repo.connection()).await.unwrap();
    assert_eq!(contacts.len(), 4);

    let notes = NotificationLog::new();
    let mut view = DealsView::new(&repo, &notes);
    view.load(contacts, companies).await.unwrap();
    assert_eq!(view.deals().len(), 6);

    view.set_query(DealQuery {
        filter: DealFilter::default().with_stage(Stage::Prospecting),
        ..DealQuery::default()
    });
    assert_eq!(view.board().bucket(Stage::Prospecting).deals.len(), 2);

    let target = view.visible()[0].id;
    let outcome = view
        .handle_drag(DragEvent::new(Stage::Prospecting, Stage::Proposal, target))
        .await
        .unwrap();
    assert!(matches!(outcome, DragOutcome::Moved(ref deal) if deal.stage == Stage::Proposal));
    assert_eq!(repo.get_by_id(target).await.unwrap().stage, Stage::Proposal);
    assert_eq!(notes.last().unwrap().message, "Deal moved to Proposal");
}
