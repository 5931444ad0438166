use chrono::Duration;
use study_core::DayBoundary;
use study_core::model::{
    Card, CardId, CardQueue, CardState, ConfId, Deck, DeckId, Prefs, ReviewGrade, ReviewLog,
    ReviewOutcome, StudyConf,
};
use study_core::time::fixed_now;
use study_storage::repository::{
    CardRepository, ConfRepository, DeckRepository, PrefsRepository, ReviewLogRepository,
    ReviewPersistence, StorageError,
};
use study_storage::sqlite::SqliteRepository;

async fn open(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn deck(id: u64, parent: Option<u64>) -> Deck {
    Deck::new(DeckId::new(id), format!("Deck {id}"), parent.map(DeckId::new), ConfId::new(1)).unwrap()
}

fn answer(card: &mut Card, deck: &mut Deck, grade: ReviewGrade) -> ReviewLog {
    let now = fixed_now();
    let outcome = ReviewOutcome::new(now + Duration::days(3), 3.0, 5.5, 0.0, 3);
    let before = card.state();
    card.apply_review(grade, &outcome, now);
    let log = ReviewLog::new(
        card.id(),
        card.deck_id(),
        grade,
        before,
        now,
        &outcome,
        card.scheduled_days(),
        card.due(),
    );
    deck.record_review(
        &DayBoundary::default(),
        now,
        card.id(),
        before == CardState::New,
        log.id,
    );
    log
}

#[tokio::test]
async fn migrate_is_idempotent() {
    let repo = open("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
    assert!(repo.list_decks().await.unwrap().is_empty());
}

#[tokio::test]
async fn deck_counters_roundtrip() {
    let repo = open("memdb_deck_counters").await;
    let mut main = deck(1, None);
    main.record_review(&DayBoundary::default(), fixed_now(), CardId::new(4), true, 11);
    main.record_review(&DayBoundary::default(), fixed_now(), CardId::new(5), false, 12);
    main.set_custom_newcard_limit(Some(7));
    repo.upsert_deck(&main).await.unwrap();
    repo.upsert_deck(&deck(2, Some(1))).await.unwrap();

    let stored = repo.get_deck(DeckId::new(1)).await.unwrap().unwrap();
    assert_eq!(stored, main);
    assert_eq!(stored.new_today(), &[CardId::new(4)]);
    assert_eq!(stored.revlogs_today(), &[11, 12]);
    assert_eq!(stored.custom_newcard_limit(), Some(7));

    let child = repo.get_deck(DeckId::new(2)).await.unwrap().unwrap();
    assert_eq!(child.parent_id(), Some(DeckId::new(1)));
    assert!(child.today().is_none());
}

#[tokio::test]
async fn get_decks_keeps_requested_order() {
    let repo = open("memdb_get_decks").await;
    for id in 1..=3 {
        repo.upsert_deck(&deck(id, None)).await.unwrap();
    }

    let decks = repo
        .get_decks(&[DeckId::new(3), DeckId::new(1)])
        .await
        .unwrap();
    let ids: Vec<u64> = decks.iter().map(|d| d.id().value()).collect();
    assert_eq!(ids, vec![3, 1]);

    let err = repo
        .get_decks(&[DeckId::new(1), DeckId::new(9)])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn card_state_and_queue_roundtrip() {
    let repo = open("memdb_cards").await;
    let mut d = deck(1, None);
    repo.upsert_deck(&d).await.unwrap();
    repo.upsert_deck(&deck(2, None)).await.unwrap();

    let fresh = Card::new(CardId::new(1), DeckId::new(1), fixed_now());
    let mut reviewed = Card::new(CardId::new(2), DeckId::new(1), fixed_now());
    answer(&mut reviewed, &mut d, ReviewGrade::Again);
    let mut suspended = Card::new(CardId::new(3), DeckId::new(2), fixed_now());
    suspended.suspend();

    for card in [&fresh, &reviewed, &suspended] {
        repo.upsert_card(card).await.unwrap();
    }

    let got = repo.get_card(CardId::new(2)).await.unwrap().unwrap();
    assert_eq!(got, reviewed);
    assert_eq!(got.state(), CardState::Learning);
    assert!(got.memory_state().is_some());

    let got = repo.get_card(CardId::new(3)).await.unwrap().unwrap();
    assert_eq!(got.queue(), CardQueue::Suspended);
    assert!(repo.get_card(CardId::new(99)).await.unwrap().is_none());

    let in_first = repo.cards_in_decks(&[DeckId::new(1)]).await.unwrap();
    assert_eq!(in_first.len(), 2);
    let all = repo
        .cards_in_decks(&[DeckId::new(2), DeckId::new(1)])
        .await
        .unwrap();
    let ids: Vec<u64> = all.iter().map(|c| c.id().value()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(repo.cards_in_decks(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn conf_and_prefs_roundtrip() {
    let repo = open("memdb_conf_prefs").await;
    assert!(repo.get_prefs().await.unwrap().is_none());
    assert!(repo.get_conf(ConfId::new(1)).await.unwrap().is_none());

    let conf = StudyConf::new(ConfId::new(1), 15, true, 150, Some(600)).unwrap();
    repo.upsert_conf(&conf).await.unwrap();
    assert_eq!(repo.get_conf(ConfId::new(1)).await.unwrap(), Some(conf));

    let prefs = Prefs::new(3 * 3_600_000, -5 * 3_600, 900).unwrap();
    repo.save_prefs(&prefs).await.unwrap();
    let updated = Prefs::new(0, 0, 1_200).unwrap();
    repo.save_prefs(&updated).await.unwrap();
    assert_eq!(repo.get_prefs().await.unwrap(), Some(updated));
}

#[tokio::test]
async fn commit_review_is_atomic() {
    let repo = open("memdb_commit").await;
    let mut d = deck(1, None);
    let mut card = Card::new(CardId::new(1), d.id(), fixed_now());
    repo.upsert_deck(&d).await.unwrap();
    repo.upsert_card(&card).await.unwrap();

    let log = answer(&mut card, &mut d, ReviewGrade::Good);
    repo.commit_review(&card, &d, &log).await.unwrap();

    let stored_deck = repo.get_deck(d.id()).await.unwrap().unwrap();
    assert_eq!(stored_deck.new_today(), &[card.id()]);
    assert_eq!(stored_deck.revlogs_today(), &[log.id]);
    let logs = repo.logs_for_card(card.id()).await.unwrap();
    assert_eq!(logs, vec![log.clone()]);
    assert_eq!(logs[0].state, CardState::New);

    // Reusing the log id must leave card and deck untouched.
    let mut again = card.clone();
    let mut changed_deck = stored_deck.clone();
    changed_deck.set_custom_newcard_limit(Some(1));
    again.suspend();
    let err = repo
        .commit_review(&again, &changed_deck, &log)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
    assert_eq!(repo.get_card(card.id()).await.unwrap().unwrap(), card);
    assert_eq!(
        repo.get_deck(d.id()).await.unwrap().unwrap().custom_newcard_limit(),
        None
    );
}
