//! Конкурентные сценарии: сериализация темы и интеграционный стресс
//! с реестром, досками и потоками-отправителями.

use std::{
    sync::{
        atomic::{AtomicIsize, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;

use doska::{
    registry, Blackboard, BlackboardRegistry, BusResult, CallOnce, EventHandler, Object, Value,
};

const NUM_THREADS: usize = 5;
const NUM_SUBTHREADS: usize = 250;
const NUM_BLACKBOARDS: usize = 5;

/// Непрозрачный токен для ссылочного значения нагрузки.
const REFERENCE_TOKEN: usize = 0xD05C;

fn make_event_content() -> Arc<Object> {
    let mut dummy = Object::new();
    dummy.insert(Value::from("stringValueKey"), Value::from("stringValueKey"));

    let mut content = Object::new();
    content
        .insert(Value::from("numberValueKey"), Value::from(3.14))
        .insert(Value::from("booleanValueKey"), Value::from(true))
        .insert(
            Value::from("referenceValueKey"),
            Value::reference(REFERENCE_TOKEN),
        )
        .insert(Value::from("stringValueKey"), Value::from("stringValue"))
        .insert(Value::from("objectValueKey"), Value::from(dummy));
    Arc::new(content)
}

fn verify_event_content(content: &Object) {
    assert_eq!(
        content
            .get(&Value::from("numberValueKey"))
            .and_then(Value::as_number),
        Some(3.14)
    );
    assert_eq!(
        content
            .get(&Value::from("booleanValueKey"))
            .and_then(Value::as_boolean),
        Some(true)
    );
    assert_eq!(
        content
            .get(&Value::from("referenceValueKey"))
            .and_then(Value::as_reference),
        Some(REFERENCE_TOKEN)
    );
    assert_eq!(
        content
            .get(&Value::from("stringValueKey"))
            .and_then(Value::as_str),
        Some("stringValue")
    );
    let nested = content
        .get(&Value::from("objectValueKey"))
        .and_then(Value::as_object)
        .expect("nested object is present");
    assert_eq!(
        nested
            .get(&Value::from("stringValueKey"))
            .and_then(Value::as_str),
        Some("stringValueKey")
    );
}

/// Один раунд отправителя: синхронная публикация плюс отложенная со сливом.
fn run_blackboard_round(blackboard: &Blackboard, content: &Arc<Object>) -> BusResult<()> {
    blackboard.post("sampleEvent", content)?;
    blackboard.post_queued("sampleEvent", content);
    blackboard.process_queued()
}

fn dummy_handler(blackboard: &Arc<Blackboard>, content: &Arc<Object>) -> EventHandler {
    let blackboard = Arc::clone(blackboard);
    let content = Arc::clone(content);
    Arc::new(move |_, seen| {
        verify_event_content(seen);
        run_blackboard_round(&blackboard, &content)?;
        Ok(true)
    })
}

fn stopping_dummy_handler(blackboard: &Arc<Blackboard>, content: &Arc<Object>) -> EventHandler {
    let blackboard = Arc::clone(blackboard);
    let content = Arc::clone(content);
    Arc::new(move |_, seen| {
        verify_event_content(seen);
        run_blackboard_round(&blackboard, &content)?;
        blackboard.stop_invocation_loop()
    })
}

fn sample_handler(counter: &Arc<Mutex<usize>>) -> EventHandler {
    let counter = Arc::clone(counter);
    Arc::new(move |_, _| {
        *counter.lock() += 1;
        Ok(true)
    })
}

/// Восемь подготовительных срабатываний: четыре вспомогательных
/// обработчика, каждый делает по синхронному и отложенному раунду.
fn prepare_blackboard(
    blackboard: &Arc<Blackboard>,
    content: &Arc<Object>,
    counter: &Arc<Mutex<usize>>,
) {
    for _ in 0..3 {
        assert_ne!(
            blackboard.register("dummyEvent", dummy_handler(blackboard, content), CallOnce::No),
            0
        );
    }
    assert_ne!(
        blackboard.register(
            "dummyEvent",
            stopping_dummy_handler(blackboard, content),
            CallOnce::Yes,
        ),
        0
    );
    assert_ne!(
        blackboard.register("sampleEvent", sample_handler(counter), CallOnce::No),
        0
    );

    blackboard.post("dummyEvent", content).unwrap();
    blackboard.clear("dummyEvent");

    for _ in 0..3 {
        assert_ne!(
            blackboard.register("dummyEvent", dummy_handler(blackboard, content), CallOnce::No),
            0
        );
    }
    assert_ne!(
        blackboard.register(
            "dummyEvent",
            stopping_dummy_handler(blackboard, content),
            CallOnce::Yes,
        ),
        0
    );
}

/// Рабочая процедура одного потока: пять именных досок, подготовка,
/// 250 подпотоков-отправителей на каждую, затем уничтожение.
fn run_registry_round(content: &Arc<Object>, counter: &Arc<Mutex<usize>>) {
    let registry = registry();
    let thread_tag = format!("{:?}", thread::current().id());

    let mut blackboards = Vec::with_capacity(NUM_BLACKBOARDS);
    for index in 0..NUM_BLACKBOARDS {
        blackboards.push(registry.create(&format!("{thread_tag}#{index}")));
    }
    for (index, blackboard) in blackboards.iter().enumerate() {
        let found = registry
            .get(&format!("{thread_tag}#{index}"))
            .expect("blackboard just created");
        assert!(Arc::ptr_eq(&found, blackboard));
    }

    for blackboard in &blackboards {
        prepare_blackboard(blackboard, content, counter);

        let mut subthreads = Vec::with_capacity(NUM_SUBTHREADS);
        for _ in 0..NUM_SUBTHREADS {
            let blackboard = Arc::clone(blackboard);
            let content = Arc::clone(content);
            subthreads.push(thread::spawn(move || {
                run_blackboard_round(&blackboard, &content).unwrap();
            }));
        }
        for subthread in subthreads {
            subthread.join().unwrap();
        }
    }

    for index in 0..NUM_BLACKBOARDS {
        registry.destroy(&format!("{thread_tag}#{index}"));
        assert!(registry.get(&format!("{thread_tag}#{index}")).is_none());
    }
}

/// Интеграционный стресс: каждый отправитель публикует `sampleEvent` по
/// разу синхронно и через очередь, плюс восемь подготовительных
/// срабатываний на доску. Итог счётчика детерминирован.
#[test]
fn concurrent_posting_across_buses() {
    BlackboardRegistry::init();

    let content = make_event_content();
    let counter = Arc::new(Mutex::new(0usize));

    let mut threads = Vec::with_capacity(NUM_THREADS);
    for _ in 0..NUM_THREADS {
        let content = Arc::clone(&content);
        let counter = Arc::clone(&counter);
        threads.push(thread::spawn(move || {
            run_registry_round(&content, &counter);
        }));
    }
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(
        *counter.lock(),
        NUM_THREADS * NUM_BLACKBOARDS * (2 * NUM_SUBTHREADS + 8)
    );

    BlackboardRegistry::shutdown();
}

/// Публикации одной темы с разных потоков не перекрываются: в каждый
/// момент внутри цикла вызова находится не больше одного потока.
#[test]
fn posts_to_one_topic_do_not_interleave() {
    let blackboard = Arc::new(Blackboard::new());
    let active = Arc::new(AtomicIsize::new(0));
    let overlapped = Arc::new(AtomicUsize::new(0));

    let guarding: EventHandler = {
        let active = Arc::clone(&active);
        let overlapped = Arc::clone(&overlapped);
        Arc::new(move |_, _| {
            if active.fetch_add(1, Ordering::SeqCst) != 0 {
                overlapped.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(1));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(true)
        })
    };
    blackboard.register("sampleEvent", guarding, CallOnce::No);

    let content = Arc::new(Object::new());
    let mut posters = Vec::with_capacity(4);
    for _ in 0..4 {
        let blackboard = Arc::clone(&blackboard);
        let content = Arc::clone(&content);
        posters.push(thread::spawn(move || {
            for _ in 0..25 {
                blackboard.post("sampleEvent", &content).unwrap();
            }
        }));
    }
    for poster in posters {
        poster.join().unwrap();
    }

    assert_eq!(overlapped.load(Ordering::SeqCst), 0);
}

/// Право слива отложенной очереди принадлежит одному потоку: сколько бы
/// потоков ни звало `process_queued`, каждая запись доставляется один раз
/// и два слива не идут одновременно.
#[test]
fn queued_drain_is_exclusive() {
    let blackboard = Arc::new(Blackboard::new());
    let active_drains = Arc::new(AtomicIsize::new(0));
    let overlapped = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(AtomicUsize::new(0));

    let slow: EventHandler = {
        let active_drains = Arc::clone(&active_drains);
        let overlapped = Arc::clone(&overlapped);
        let delivered = Arc::clone(&delivered);
        Arc::new(move |_, _| {
            if active_drains.fetch_add(1, Ordering::SeqCst) != 0 {
                overlapped.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(1));
            active_drains.fetch_sub(1, Ordering::SeqCst);
            delivered.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        })
    };
    blackboard.register("sampleEvent", slow, CallOnce::No);

    let content = Arc::new(Object::new());
    for _ in 0..8 {
        blackboard.post_queued("sampleEvent", &content);
    }

    let mut drainers = Vec::with_capacity(4);
    for _ in 0..4 {
        let blackboard = Arc::clone(&blackboard);
        drainers.push(thread::spawn(move || {
            blackboard.process_queued().unwrap();
        }));
    }
    for drainer in drainers {
        drainer.join().unwrap();
    }

    assert_eq!(delivered.load(Ordering::SeqCst), 8);
    assert_eq!(overlapped.load(Ordering::SeqCst), 0);
}
