mod common;

use fakebind::{ActualInvocationsSource, Error, Recording, wrap_function, wrap_impl, wrapper};

#[wrap_function]
fn store(key: &str, value: u64) -> bool {
    !key.is_empty() && value > 0
}

#[wrap_function]
fn flush() {}

pub struct Handle;

#[derive(Debug)]
pub struct Account {
    balance: i64,
}

#[wrap_impl]
impl Account {
    #[wrap]
    pub fn deposit(&mut self, amount: i64) -> i64 {
        self.balance += amount;
        self.balance
    }

    #[wrap]
    pub fn attach(&self, _handle: Handle) -> bool {
        true
    }
}

#[test]
fn test_records_arguments_in_call_order() {
    common::setup_logging();
    let recording = Recording::new();
    let _store = wrapper!(store).fake_recorded(&recording, |_, _| true);
    let _flush = wrapper!(flush).fake_recorded(&recording, || {});

    assert!(store("a", 0));
    flush();
    assert!(store("b", 2));

    let calls: Vec<String> = recording
        .all_actual_invocations()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        calls,
        [
            "recording::store(\"a\", 0)",
            "recording::flush()",
            "recording::store(\"b\", 2)",
        ]
    );

    let stub = recording.stub(wrapper!(store));
    assert_eq!(stub.len(), 2);
    let ordinals: Vec<u64> = stub.invocations().iter().map(|call| call.ordinal()).collect();
    assert_eq!(ordinals, [0, 2]);
}

#[test]
fn test_method_records_receiver_first() {
    let recording = Recording::new();
    let _fake = wrapper!(Account::deposit).fake_recorded(&recording, |account, amount| {
        account.balance -= amount;
        account.balance
    });

    let mut account = Account { balance: 10 };
    assert_eq!(account.deposit(4), 6);

    let stub = recording.stub(wrapper!(Account::deposit));
    assert_eq!(stub.method_name(), "recording::Account::deposit");
    let invocations = stub.invocations();
    assert_eq!(invocations.len(), 1);
    // The receiver is captured before the stand-in runs.
    assert_eq!(invocations[0].arguments(), ["Account { balance: 10 }", "4"]);
}

#[test]
fn test_receiver_agnostic_recording() {
    let recording = Recording::new();
    let _fake = wrapper!(Account::deposit).fake_any_recorded(&recording, |amount| amount * 100);
    let mut account = Account { balance: 0 };
    assert_eq!(account.deposit(2), 200);
    assert_eq!(account.balance, 0);
    assert_eq!(recording.stub(wrapper!(Account::deposit)).len(), 1);
}

#[test]
fn test_opaque_arguments_use_type_name() {
    let recording = Recording::new();
    let _fake = wrapper!(Account::attach).fake_any_recorded(&recording, |_| false);
    assert!(!Account { balance: 0 }.attach(Handle));

    let mut all = Vec::new();
    recording.actual_invocations(&mut all);
    assert_eq!(all[0].arguments()[1], "<recording::Handle>");
}

#[test]
fn test_scan_and_clear() {
    let recording = Recording::new();
    let _fake = wrapper!(store).fake_recorded(&recording, |key, _| key == "yes");
    store("yes", 1);
    store("no", 1);

    let stub = recording.stub(wrapper!(store));
    let mut keys = Vec::new();
    stub.scan(|call| keys.push(call.arguments()[0].clone()));
    assert_eq!(keys, ["\"yes\"", "\"no\""]);

    recording.clear();
    assert!(stub.is_empty());
    store("again", 1);
    assert_eq!(stub.len(), 1);
    assert_eq!(stub.invocations()[0].ordinal(), 2);
}

#[test]
fn test_original_method_unsupported() {
    let recording = Recording::new();
    let stub = recording.stub(wrapper!(store));
    assert!(matches!(stub.original_method(), Err(Error::Unsupported(_))));
}

#[test]
fn test_recording_outlives_fake() {
    let recording = Recording::new();
    {
        let _fake = wrapper!(flush).fake_recorded(&recording, || {});
        flush();
    }
    flush();
    assert_eq!(recording.stub(wrapper!(flush)).len(), 1);
}

#[test]
fn test_arguments_outlive_borrowed_values() {
    let recording = Recording::new();
    let _store = wrapper!(store).fake_recorded(&recording, |_, _| true);
    {
        let key = String::from("temporary");
        assert!(store(&key, 3));
    }
    let stub = recording.stub(wrapper!(store));
    let mut matched = 0;
    stub.scan(|call| {
        if call.arguments() == ["\"temporary\"", "3"] {
            matched += 1;
        }
    });
    assert_eq!(matched, 1);
}
