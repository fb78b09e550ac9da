use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc::channel;
use futures::channel::mpsc::Sender;
use futures::SinkExt;
use iced::event::{self, Event};
use iced::theme::{self, Theme};
use iced::widget::{button, column, container, horizontal_rule, row, scrollable, text, Column};
use iced::{Alignment, Application, Command, Element, Length, Settings, Size, Subscription, window};
use log::{error, info};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::system::{SystemAdapter, SystemAuthority};
use crate::device::types::{ScanEvent, WorkerCommand};
use crate::device::worker::{scan_worker_subscription, CommandReceiverSlot};
use crate::error::AppRunError;
use crate::gui::style::DeviceRowStyleSheet;
use crate::gui::types::Message;
use crate::scan::capability::{AdapterStatus, CapabilityState, PermissionAuthority};
use crate::scan::constants::{COMMAND_CHANNEL_CAPACITY, NOTICE_LINGER};
use crate::scan::controller::ScanController;
use crate::scan::types::{Action, ConnectionPhase};

pub struct ApplicationFlags {
    config_io: ConfigIO,
}

pub struct ScanApplication {
    // this token is cancelled upon exit
    app_cancel: CancellationToken,

    // the latest transient notice; cleared again by a one-shot timer
    notice: Option<String>,
    notice_seq: u64,

    config_io: ConfigIO,
    config: Config,

    capability_state: Arc<CapabilityState>,
    authority: Arc<SystemAuthority>,
    adapter: Arc<SystemAdapter>,

    controller: ScanController,

    worker_commands: Sender<WorkerCommand>,
    worker_commands_receiver: CommandReceiverSlot,
}

impl ScanApplication {
    fn load_config(&self) -> Command<Message> {
        let config_io = self.config_io.clone();

        let fut = async move {
            if let Err(err) = config_io.ensure_initialized().await {
                error!("Failed to initialize config: {:?}", &err);
            }

            match config_io.read().await {
                Ok(config) => (config, None),
                Err(err) => {
                    error!("Failed to load config: {:?}", &err);
                    (Config::default(), Some(format!("Failed to load config: {}", &err)))
                },
            }
        };

        Command::perform(fut, Message::ConfigLoadComplete)
    }

    fn send_worker_command(&self, command: WorkerCommand) -> Command<Message> {
        let mut sender = self.worker_commands.clone();

        let fut = async move {
            sender.send(command).await.expect("Failed to send WorkerCommand");
        };

        Command::perform(fut, Message::WorkerCommandSent)
    }

    /// Execute the side effects the controller asked for.
    fn perform_actions(&mut self, actions: Vec<Action>) -> Command<Message> {
        let mut commands: Vec<Command<Message>> = Vec::new();

        for action in actions {
            match action {
                Action::StartDiscovery { name_filter } => {
                    commands.push(self.send_worker_command(WorkerCommand::StartScan { name_filter }));
                },
                Action::StopDiscovery => {
                    commands.push(self.send_worker_command(WorkerCommand::StopScan));
                },
                Action::Connect { device_id } => {
                    commands.push(self.send_worker_command(WorkerCommand::Connect { device_id }));
                },
                Action::ScheduleTimeout { generation, after } => {
                    let fut = async move {
                        sleep(after).await;
                        generation
                    };
                    commands.push(Command::perform(fut, Message::ScanTimeout));
                },
                Action::RequestPermissions(capabilities) => {
                    let fut = self.authority.request(&capabilities);
                    commands.push(Command::perform(fut, Message::PermissionsResolved));
                },
                Action::RequestAdapterEnable => {
                    let fut = self.adapter.request_enable();
                    commands.push(Command::perform(fut, Message::AdapterEnableResolved));
                },
                Action::Notice(notice) => {
                    info!("Notice: {}", notice);
                    self.notice_seq += 1;
                    self.notice = Some(notice);

                    let seq = self.notice_seq;
                    let fut = async move {
                        sleep(NOTICE_LINGER).await;
                        seq
                    };
                    commands.push(Command::perform(fut, Message::NoticeExpired));
                },
            }
        }

        Command::batch(commands)
    }

    fn status_line(&self) -> String {
        if self.controller.is_scanning() {
            return format!("Scanning for \"{}\"…", self.config.device_name);
        }

        match self.controller.connection() {
            ConnectionPhase::Idle => "Idle".to_string(),
            ConnectionPhase::Connecting(id) => format!("Connecting to {}…", id),
            ConnectionPhase::Connected(id) => format!("Connected to {}", id),
            ConnectionPhase::Disconnected(id) => format!("Disconnected from {}", id),
        }
    }
}

impl Application for ScanApplication {
    type Executor = iced::executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApplicationFlags;

    fn new(flags: ApplicationFlags) -> (ScanApplication, Command<Self::Message>) {
        let app_cancel = CancellationToken::new();

        let capability_state = Arc::new(CapabilityState::default());
        let authority = Arc::new(SystemAuthority::new(capability_state.clone()));
        let adapter = Arc::new(SystemAdapter::new(capability_state.clone()));
        let mut controller = ScanController::new(authority.clone(), adapter.clone());
        let init_actions = controller.init();

        let (worker_commands, receiver) = channel::<WorkerCommand>(COMMAND_CHANNEL_CAPACITY);

        let mut app = ScanApplication {
            app_cancel,
            notice: None,
            notice_seq: 0,
            config_io: flags.config_io,
            config: Config::default(),
            capability_state,
            authority,
            adapter,
            controller,
            worker_commands,
            worker_commands_receiver: Arc::new(Mutex::new(Some(receiver))),
        };

        let command = Command::batch(vec![
            app.load_config(),
            app.perform_actions(init_actions),
        ]);
        (app, command)
    }

    fn title(&self) -> String {
        String::from(concat!("FastRec Scan ", env!("CARGO_PKG_VERSION")))
    }

    fn update(&mut self, message: Message) -> Command<Self::Message> {
        match message {
            Message::ConfigLoadComplete((config, error_message)) => {
                info!("Config load complete");
                self.controller.set_target_name(config.device_name.clone());
                self.controller.set_scan_period(Duration::from_secs(config.scan_period_secs));
                self.config = config;

                if let Some(error_message) = error_message {
                    return self.perform_actions(vec![Action::Notice(error_message)]);
                }
            },
            Message::ScanButtonPressed => {
                let actions = self.controller.toggle_scan();
                return self.perform_actions(actions);
            },
            Message::DeviceRowPressed(index) => {
                let actions = self.controller.connect_to_device(index);
                return self.perform_actions(actions);
            },
            Message::ScanTimeout(generation) => {
                let actions = self.controller.on_scan_timeout(generation);
                return self.perform_actions(actions);
            },
            Message::ScanEvent(ScanEvent::Advertisement { device_id, name }) => {
                let actions = self.controller.on_advertisement(device_id, name);
                return self.perform_actions(actions);
            },
            Message::ScanEvent(ScanEvent::Connection { device_id, connected }) => {
                let actions = self.controller.on_connection_change(device_id, connected);
                return self.perform_actions(actions);
            },
            Message::ScanEvent(ScanEvent::Fault(scan_error)) => {
                let actions = self.controller.on_fault(scan_error);
                return self.perform_actions(actions);
            },
            Message::PermissionsResolved(grants) => {
                let actions = self.controller.on_permissions_resolved(grants);
                return self.perform_actions(actions);
            },
            Message::AdapterEnableResolved(enabled) => {
                let actions = self.controller.on_adapter_enable_resolved(enabled);
                return self.perform_actions(actions);
            },
            Message::NoticeExpired(seq) => {
                if seq == self.notice_seq {
                    self.notice = None;
                }
            },
            Message::EventOccurred(Event::Window(id, window::Event::CloseRequested)) => {
                info!("Close requested");
                let actions = self.controller.shutdown();
                let effects = self.perform_actions(actions);
                self.app_cancel.cancel();
                return Command::batch(vec![effects, window::close(id)]);
            },

            _ => {},
        }

        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            event::listen().map(Message::EventOccurred),
            scan_worker_subscription(
                self.app_cancel.clone(),
                self.worker_commands_receiver.clone(),
                self.capability_state.clone(),
            ).map(Message::ScanEvent),
        ])
    }

    fn view(&self) -> Element<Message> {
        let scan_button = button(
            text(if self.controller.is_scanning() { "Stop scan" } else { "Scan" })
        )
        .style(theme::Button::Primary)
        .on_press(Message::ScanButtonPressed);

        let status = text(self.status_line()).size(14);

        let device_list: Element<Message> = if self.controller.device_count() == 0 {
            text("No devices found yet.").size(14).into()
        } else {
            let rows = self.controller.devices().enumerate().map(|(index, device)| {
                button(text(device.label()).size(14))
                    .style(theme::Button::Custom(Box::new(DeviceRowStyleSheet)))
                    .width(Length::Fill)
                    .padding(10)
                    .on_press(Message::DeviceRowPressed(index))
                    .into()
            });

            scrollable(
                Column::with_children(rows)
                    .spacing(5)
                    .width(Length::Fill)
            ).into()
        };

        let mut content = column![
            row![scan_button, status]
                .align_items(Alignment::Center)
                .spacing(20),

            horizontal_rule(10),

            device_list,
        ]
        .spacing(20);

        if let Some(notice) = &self.notice {
            content = column![text(notice).size(14), content].spacing(20);
        }

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .padding(20)
            .into()
    }
}

pub fn run_application() -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::new_sync()?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let flags = ApplicationFlags { config_io };
    let mut settings = Settings::with_flags(flags);

    // handle exits ourselves (Event::CloseRequested)
    settings.id = Some("fastrec-scan".to_string());
    settings.window.exit_on_close_request = false;
    settings.window.size = Size::new(420.0, 560.0);
    settings.window.resizable = false;

    // this function will call process::exit() unless there was a startup error
    ScanApplication::run(settings)?;
    Ok(())
}
