use crate::dispatch::QueuedSender;
use crate::hooks::{ImeCallback, ImeEventSource, ImePhase};
use crate::ports::{ForceDarkPort, NightMode};
use anyhow::Result;
use autodark_misc::debug_on;
use autodark_misc::ext::ResultExt;
use autodark_shared::channel::{BroadcastSender, Permission};
use autodark_shared::protocol::Message;
use autodark_shared::settings::Settings;
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The keyboard view, tagged with the force-dark value it was built under.
pub trait InputView {
    fn tag(&self) -> Option<bool>;
    fn set_tag(&self, force_dark: bool);
}

/// The input-method service the hooks fired on.
pub trait InputMethodHost {
    fn night_mode(&self) -> NightMode;
    fn input_view(&self) -> Option<&dyn InputView>;

    /// Drops the current view so the framework has to build a new one.
    fn clear_input_view(&self);
}

pub struct ImeViewLifecycleInterceptor {
    package: String,
    host_package: String,
    invalidated: AtomicBool,
    flag: Arc<dyn ForceDarkPort>,
    sender: Arc<dyn BroadcastSender>,
}

impl ImeViewLifecycleInterceptor {
    pub fn new(
        package: impl Into<String>,
        host_package: impl Into<String>,
        flag: Arc<dyn ForceDarkPort>,
        sender: Arc<dyn BroadcastSender>,
    ) -> Self {
        Self {
            package: package.into(),
            host_package: host_package.into(),
            invalidated: AtomicBool::new(false),
            flag,
            sender,
        }
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    pub fn dispatch(&self, phase: ImePhase, host: &dyn InputMethodHost) {
        match phase {
            ImePhase::InputViewShown => self.on_update_input_view_shown(host),
            ImePhase::SetInputView => self.on_set_input_view(host),
        }
    }

    /// An untagged view was built without us knowing which force-dark value applied, so
    /// announce this IME to the host and make the framework rebuild the view.
    pub fn on_update_input_view_shown(&self, host: &dyn InputMethodHost) {
        if host.night_mode().is_off() {
            return;
        }

        if let Some(tag) = host.input_view().and_then(|view| view.tag()) {
            if debug_on!("ime") {
                debug!("input view shown, tag: {tag}, force-dark: {}", self.flag.read());
            }
            return;
        }

        debug!("{}: invalidating input view", self.package);

        self.sender
            .send_message(
                Message::ImeUpdate(self.package.clone()),
                &self.host_package,
                Permission::ReceiveDarkBroadcast,
            )
            .log_if_error();

        host.clear_input_view();
        self.invalidated.store(true, Ordering::Release);
    }

    pub fn on_set_input_view(&self, host: &dyn InputMethodHost) {
        let Some(view) = host.input_view() else {
            return;
        };

        if view.tag().is_some() {
            return;
        }

        if self
            .invalidated
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let force_dark = self.flag.read();
            view.set_tag(force_dark);
            debug!("{}: tagged new input view, force-dark: {force_dark}", self.package);
        }
    }
}

pub struct ImeModule;

impl ImeModule {
    /// Installs the IME hooks unless the user left IME handling disabled. Broadcasts leave
    /// through a [QueuedSender] so the hooked service never waits on the host.
    pub fn attach(
        settings: &Settings,
        source: &dyn ImeEventSource,
        flag: Arc<dyn ForceDarkPort>,
        sender: Arc<dyn BroadcastSender>,
    ) -> Result<Option<Arc<ImeViewLifecycleInterceptor>>> {
        if !settings.ime_hook_enabled() {
            debug!("IME hooking disabled, skip {}", source.package());
            return Ok(None);
        }

        let (queued, _worker) = QueuedSender::spawn(sender)?;

        let interceptor = Arc::new(ImeViewLifecycleInterceptor::new(
            source.package(),
            &settings.host_package,
            flag,
            Arc::new(queued),
        ));

        let callback: ImeCallback = {
            let interceptor = interceptor.clone();
            Box::new(move |phase: ImePhase, host: &dyn InputMethodHost| {
                interceptor.dispatch(phase, host)
            })
        };

        source.install_ime_hooks(callback)?;
        info!("IME hooks installed in {}", source.package());

        Ok(Some(interceptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MemoryFlag;
    use autodark_shared::protocol::Broadcast;
    use parking_lot::Mutex;
    use std::cell::Cell;

    #[derive(Default)]
    struct RecordingSender(Mutex<Vec<Broadcast>>);

    impl BroadcastSender for RecordingSender {
        fn send(&self, broadcast: &Broadcast, _: Permission) -> Result<()> {
            self.0.lock().push(broadcast.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct View(Cell<Option<bool>>);

    impl InputView for View {
        fn tag(&self) -> Option<bool> {
            self.0.get()
        }

        fn set_tag(&self, force_dark: bool) {
            self.0.set(Some(force_dark))
        }
    }

    struct Service {
        mode: NightMode,
        view: Option<View>,
        cleared: Cell<bool>,
    }

    impl Service {
        fn with_view(mode: NightMode, tag: Option<bool>) -> Self {
            Self {
                mode,
                view: Some(View(Cell::new(tag))),
                cleared: Cell::new(false),
            }
        }
    }

    impl InputMethodHost for Service {
        fn night_mode(&self) -> NightMode {
            self.mode
        }

        fn input_view(&self) -> Option<&dyn InputView> {
            self.view.as_ref().map(|view| view as &dyn InputView)
        }

        fn clear_input_view(&self) {
            self.cleared.set(true)
        }
    }

    fn interceptor(force_dark: bool) -> (ImeViewLifecycleInterceptor, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::default());
        let interceptor = ImeViewLifecycleInterceptor::new(
            "com.example.ime",
            "android",
            Arc::new(MemoryFlag::new(force_dark)),
            sender.clone(),
        );
        (interceptor, sender)
    }

    #[test]
    fn untagged_view_is_invalidated_and_announced() {
        let (interceptor, sender) = interceptor(true);
        let service = Service::with_view(NightMode::Yes, None);

        interceptor.on_update_input_view_shown(&service);

        assert!(interceptor.is_invalidated());
        assert!(service.cleared.get());

        let sent = sender.0.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].package, "android");
        assert_eq!(
            Message::try_from(sent[0].clone()).unwrap(),
            Message::ImeUpdate("com.example.ime".into())
        );
    }

    #[test]
    fn missing_view_counts_as_untagged() {
        let (interceptor, sender) = interceptor(false);
        let service = Service {
            mode: NightMode::Auto,
            view: None,
            cleared: Cell::new(false),
        };

        interceptor.on_update_input_view_shown(&service);

        assert!(interceptor.is_invalidated());
        assert_eq!(sender.0.lock().len(), 1);
    }

    #[test]
    fn tagged_view_is_left_alone() {
        let (interceptor, sender) = interceptor(true);
        let service = Service::with_view(NightMode::Yes, Some(false));

        interceptor.on_update_input_view_shown(&service);

        assert!(!interceptor.is_invalidated());
        assert!(!service.cleared.get());
        assert!(sender.0.lock().is_empty());
    }

    #[test]
    fn night_mode_off_skips_everything() {
        let (interceptor, sender) = interceptor(true);
        let service = Service::with_view(NightMode::No, None);

        interceptor.on_update_input_view_shown(&service);

        assert!(!interceptor.is_invalidated());
        assert!(sender.0.lock().is_empty());
    }

    #[test]
    fn rebuilt_view_is_stamped_once() {
        let (interceptor, _sender) = interceptor(true);

        let shown = Service::with_view(NightMode::Yes, None);
        interceptor.on_update_input_view_shown(&shown);

        let rebuilt = Service::with_view(NightMode::Yes, None);
        interceptor.on_set_input_view(&rebuilt);

        assert_eq!(rebuilt.input_view().unwrap().tag(), Some(true));
        assert!(!interceptor.is_invalidated());

        // no pending invalidation, the next fresh view stays untagged
        let another = Service::with_view(NightMode::Yes, None);
        interceptor.on_set_input_view(&another);
        assert_eq!(another.input_view().unwrap().tag(), None);
    }

    #[test]
    fn set_view_without_invalidation_does_not_tag() {
        let (interceptor, _sender) = interceptor(false);
        let service = Service::with_view(NightMode::Yes, None);

        interceptor.dispatch(ImePhase::SetInputView, &service);

        assert_eq!(service.input_view().unwrap().tag(), None);
    }

    #[test]
    fn already_tagged_view_keeps_invalidation_pending() {
        let (interceptor, _sender) = interceptor(true);

        interceptor.dispatch(
            ImePhase::InputViewShown,
            &Service::with_view(NightMode::Yes, None),
        );

        let tagged = Service::with_view(NightMode::Yes, Some(false));
        interceptor.dispatch(ImePhase::SetInputView, &tagged);

        assert_eq!(tagged.input_view().unwrap().tag(), Some(false));
        assert!(interceptor.is_invalidated());
    }

    struct FakeIme {
        callback: Mutex<Option<ImeCallback>>,
    }

    impl ImeEventSource for FakeIme {
        fn package(&self) -> &str {
            "com.example.ime"
        }

        fn install_ime_hooks(&self, callback: ImeCallback) -> Result<()> {
            *self.callback.lock() = Some(callback);
            Ok(())
        }
    }

    #[test]
    fn module_installs_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            data_dir: dir.path().into(),
            ..Default::default()
        };
        let source = FakeIme {
            callback: Mutex::new(None),
        };
        let sender = Arc::new(RecordingSender::default());

        let skipped = ImeModule::attach(
            &settings,
            &source,
            Arc::new(MemoryFlag::new(true)),
            sender.clone(),
        )
        .unwrap();
        assert!(skipped.is_none());
        assert!(source.callback.lock().is_none());

        std::fs::write(settings.ime_flag_path(), "").unwrap();

        let interceptor = ImeModule::attach(
            &settings,
            &source,
            Arc::new(MemoryFlag::new(true)),
            sender.clone(),
        )
        .unwrap()
        .unwrap();

        let service = Service::with_view(NightMode::Yes, None);
        if let Some(callback) = source.callback.lock().as_ref() {
            callback(ImePhase::InputViewShown, &service);
        }

        assert!(interceptor.is_invalidated());

        while sender.0.lock().is_empty() {
            std::thread::yield_now();
        }
        assert_eq!(sender.0.lock().len(), 1);
    }
}
