//! Recording doubles for the gateway, notifier, and recorder seams.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    thread,
    time::Duration,
};

use crate::{
    db::NewScanRecord,
    gateway::{DeviceGateway, GatewayError, Light},
    notify::{NotificationLevel, Notifier, StationEvent},
    recorder::OutcomeRecorder,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Connect { address: String, port: u16 },
    Disconnect,
    OpenCamera(u32),
    CloseCamera,
    SetLight { light: Light, on: bool },
    Capture(String),
}

#[derive(Default)]
struct GatewayScript {
    plc_connected: bool,
    camera_connected: bool,
    machine_code: i32,
    fail_queries: bool,
    fail_machine_code: bool,
    query_hang: Duration,
    calls: Vec<GatewayCall>,
    light_writes: usize,
    fault_light_write_at: Option<usize>,
    capture_count: usize,
    capture_script: HashMap<usize, Result<bool, GatewayError>>,
    panic_capture_at: Option<usize>,
}

/// Gateway that logs every actuation and replays scripted failures.
/// Counters are 1-based.
#[derive(Default)]
pub struct RecordingGateway {
    script: Mutex<GatewayScript>,
    queries_in_flight: AtomicUsize,
    peak_queries: AtomicUsize,
}

struct QueryGuard<'a>(&'a AtomicUsize);

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_plc_connected(&self, connected: bool) {
        self.script.lock().unwrap().plc_connected = connected;
    }

    pub fn set_camera_connected(&self, connected: bool) {
        self.script.lock().unwrap().camera_connected = connected;
    }

    pub fn set_machine_code(&self, code: i32) {
        self.script.lock().unwrap().machine_code = code;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.script.lock().unwrap().fail_queries = fail;
    }

    pub fn fail_machine_code(&self, fail: bool) {
        self.script.lock().unwrap().fail_machine_code = fail;
    }

    /// Makes every PLC connectivity query block for `hang` first.
    pub fn hang_queries(&self, hang: Duration) {
        self.script.lock().unwrap().query_hang = hang;
    }

    /// Most PLC connectivity queries ever running at the same time.
    pub fn peak_concurrent_queries(&self) -> usize {
        self.peak_queries.load(Ordering::SeqCst)
    }

    fn enter_query(&self) -> QueryGuard<'_> {
        let now = self.queries_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_queries.fetch_max(now, Ordering::SeqCst);

        let hang = self.script.lock().unwrap().query_hang;
        if !hang.is_zero() {
            thread::sleep(hang);
        }
        QueryGuard(&self.queries_in_flight)
    }

    pub fn fault_light_write_at(&self, call: usize) {
        self.script.lock().unwrap().fault_light_write_at = Some(call);
    }

    pub fn script_capture(&self, capture: usize, result: Result<bool, GatewayError>) {
        self.script
            .lock()
            .unwrap()
            .capture_script
            .insert(capture, result);
    }

    pub fn panic_capture_at(&self, capture: usize) {
        self.script.lock().unwrap().panic_capture_at = Some(capture);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn light_calls(&self) -> Vec<(Light, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::SetLight { light, on } => Some((light, on)),
                _ => None,
            })
            .collect()
    }

    pub fn captures(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Capture(name) => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl DeviceGateway for RecordingGateway {
    fn connect(&self, address: &str, port: u16) -> Result<(), GatewayError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(GatewayCall::Connect {
            address: address.to_string(),
            port,
        });
        script.plc_connected = true;
        Ok(())
    }

    fn disconnect(&self) {
        let mut script = self.script.lock().unwrap();
        script.calls.push(GatewayCall::Disconnect);
        script.plc_connected = false;
    }

    fn open_camera(&self, device_index: u32) -> Result<(), GatewayError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(GatewayCall::OpenCamera(device_index));
        script.camera_connected = true;
        Ok(())
    }

    fn close_camera(&self) {
        let mut script = self.script.lock().unwrap();
        script.calls.push(GatewayCall::CloseCamera);
        script.camera_connected = false;
    }

    fn is_plc_connected(&self) -> Result<bool, GatewayError> {
        let _query = self.enter_query();
        let script = self.script.lock().unwrap();
        if script.fail_queries {
            return Err(GatewayError::Native("injected query failure".into()));
        }
        Ok(script.plc_connected)
    }

    fn is_camera_connected(&self) -> Result<bool, GatewayError> {
        let script = self.script.lock().unwrap();
        if script.fail_queries {
            return Err(GatewayError::Native("injected query failure".into()));
        }
        Ok(script.camera_connected)
    }

    fn read_machine_code(&self) -> Result<i32, GatewayError> {
        let script = self.script.lock().unwrap();
        if script.fail_queries || script.fail_machine_code {
            return Err(GatewayError::Native("injected machine code failure".into()));
        }
        Ok(script.machine_code)
    }

    fn set_light_output(&self, light: Light, on: bool) -> Result<(), GatewayError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(GatewayCall::SetLight { light, on });
        script.light_writes += 1;
        if script.fault_light_write_at == Some(script.light_writes) {
            return Err(GatewayError::Native(format!(
                "injected fault on light write {}",
                script.light_writes
            )));
        }
        Ok(())
    }

    fn capture_image(&self, filename: &str) -> Result<bool, GatewayError> {
        let (count, scripted, panic_now) = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(GatewayCall::Capture(filename.to_string()));
            script.capture_count += 1;
            let count = script.capture_count;
            (
                count,
                script.capture_script.remove(&count),
                script.panic_capture_at == Some(count),
            )
        };

        if panic_now {
            panic!("injected panic on capture {count}");
        }
        scripted.unwrap_or(Ok(true))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<StationEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<StationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self, level: NotificationLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                StationEvent::Notification(n) if n.level == level => Some(n.message),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.messages(NotificationLevel::Warning)
    }

    pub fn count(&self, level: NotificationLevel) -> usize {
        self.events()
            .iter()
            .filter(|event| event.level() == level)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn emit(&self, event: StationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct RecordingRecorder {
    records: Mutex<Vec<NewScanRecord>>,
}

impl RecordingRecorder {
    pub fn records(&self) -> Vec<NewScanRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl OutcomeRecorder for RecordingRecorder {
    fn record(&self, record: NewScanRecord) {
        self.records.lock().unwrap().push(record);
    }
}
