// Integration tests for conversation storage feeding the engine
use contextbuddy::session::{ConversationStore, FileConversationStore, MemoryConversationStore};
use contextbuddy::types::{ConversationTurn, Role};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn exchange(store: &dyn ConversationStore, session: &str, question: &str, reply: &str) {
    store.append(session, ConversationTurn::user(question)).unwrap();
    store.append(session, ConversationTurn::assistant(reply)).unwrap();
}

#[test]
fn test_file_store_survives_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let store = FileConversationStore::new(temp.path()).unwrap();
        exchange(&store, "research", "what is attention?", "a weighting scheme");
    }

    let reopened = FileConversationStore::new(temp.path()).unwrap();
    let turns = reopened.read("research").unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[1].content, "a weighting scheme");
}

#[test]
fn test_sessions_are_isolated() {
    let temp = TempDir::new().unwrap();
    let store = FileConversationStore::new(temp.path()).unwrap();
    exchange(&store, "a", "q1", "r1");
    exchange(&store, "b", "q2", "r2");
    exchange(&store, "a", "q3", "r3");

    let a: Vec<String> = store
        .read("a")
        .unwrap()
        .into_iter()
        .map(|t| t.content)
        .collect();
    assert_eq!(a, vec!["q1", "r1", "q3", "r3"]);
    assert_eq!(store.read("b").unwrap().len(), 2);
    assert_eq!(store.list_sessions().unwrap().len(), 2);
}

#[test]
fn test_concurrent_appends_are_not_lost() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FileConversationStore::new(temp.path()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..10 {
                    store
                        .append("shared", ConversationTurn::user(format!("w{} m{}", worker, i)))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.read("shared").unwrap().len(), 40);
}

#[test]
fn test_generated_session_ids_are_valid_and_unique() {
    let temp = TempDir::new().unwrap();
    let store = FileConversationStore::new(temp.path()).unwrap();
    let first = FileConversationStore::new_session_id();
    let second = FileConversationStore::new_session_id();

    assert_ne!(first, second);
    exchange(&store, &first, "q", "r");
    assert_eq!(store.read(&first).unwrap().len(), 2);
}

#[test]
fn test_memory_and_file_stores_agree() {
    let temp = TempDir::new().unwrap();
    let stores: Vec<Box<dyn ConversationStore>> = vec![
        Box::new(MemoryConversationStore::new()),
        Box::new(FileConversationStore::new(temp.path()).unwrap()),
    ];

    for store in &stores {
        exchange(store.as_ref(), "s", "hello", "hi");
        let turns = store.read("s").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "hello");
        assert!(store.read("missing").unwrap().is_empty());
        assert!(store.append("bad/id", ConversationTurn::user("x")).is_err());
    }
}

#[test]
fn test_topic_labels_session_in_listing() {
    let temp = TempDir::new().unwrap();
    let store = FileConversationStore::new(temp.path()).unwrap();
    let id = FileConversationStore::new_session_id();

    store.set_topic(&id, "transformers").unwrap();
    exchange(&store, &id, "what is attention?", "a weighting scheme");
    exchange(&store, "untitled", "q", "r");

    let sessions = store.list_sessions().unwrap();
    let labelled = sessions.iter().find(|s| s.session_id == id).unwrap();
    assert_eq!(labelled.topic.as_deref(), Some("transformers"));
    assert_eq!(labelled.total_turns, 2);

    let untitled = sessions.iter().find(|s| s.session_id == "untitled").unwrap();
    assert!(untitled.topic.is_none());
}
