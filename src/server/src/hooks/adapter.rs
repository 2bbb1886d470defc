use anyhow::{Result, bail};
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, IntoStaticStr};

pub const FLAG_ACTIVITY_LAUNCHED_FROM_HISTORY: i32 = 0x0010_0000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentName {
    pub package: String,
    pub class: String,
}

impl ComponentName {
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intent {
    pub component: Option<ComponentName>,
    pub flags: i32,
}

impl Intent {
    pub fn has_flag(&self, flag: i32) -> bool {
        self.flags & flag == flag
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRecord {
    pub real_activity: Option<ComponentName>,
}

/// One argument of a hooked call as the hooking layer hands it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookArg {
    Null,
    Str(String),
    Intent(Intent),
    Task(TaskRecord),
    Object,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LaunchEntry {
    /// `ActivityTaskManagerService#startActivityAsUser`
    StartActivityAsUser,
    /// `ActivityStartController#startActivityInPackage`, the recents/history relaunch path
    StartActivityInPackage,
}

impl LaunchEntry {
    pub fn class_name(self) -> &'static str {
        match self {
            LaunchEntry::StartActivityAsUser => "com.android.server.wm.ActivityTaskManagerService",
            LaunchEntry::StartActivityInPackage => "com.android.server.wm.ActivityStartController",
        }
    }

    pub fn method_name(self) -> &'static str {
        match self {
            LaunchEntry::StartActivityAsUser => "startActivityAsUser",
            LaunchEntry::StartActivityInPackage => "startActivityInPackage",
        }
    }

    /// Parameter types of the hooked method, used by the hooking layer to resolve the overload.
    // https://android.googlesource.com/platform/frameworks/base/+/android-11.0.0_r1/services/core/java/com/android/server/wm/ActivityTaskManagerService.java#1077
    // https://android.googlesource.com/platform/frameworks/base/+/android-11.0.0_r1/services/core/java/com/android/server/wm/ActivityStartController.java#283
    pub fn signature(self, version: SdkVersion) -> Vec<&'static str> {
        match self {
            LaunchEntry::StartActivityAsUser => {
                let mut params = vec![
                    "android.app.IApplicationThread", // caller
                    "java.lang.String",               // callingPackage
                    "java.lang.String",               // callingFeatureId
                    "android.content.Intent",         // intent
                    "java.lang.String",               // resolvedType
                    "android.os.IBinder",             // resultTo
                    "java.lang.String",               // resultWho
                    "int",                            // requestCode
                    "int",                            // startFlags
                    "android.app.ProfilerInfo",       // profilerInfo
                    "android.os.Bundle",              // bOptions
                    "int",                            // userId
                    "boolean",                        // validateIncomingUser
                ];

                if version == SdkVersion::Q {
                    params.remove(2);
                }

                params
            }
            LaunchEntry::StartActivityInPackage => {
                let mut params = vec![
                    "int",                                       // uid
                    "int",                                       // realCallingPid
                    "int",                                       // realCallingUid
                    "java.lang.String",                          // callingPackage
                    "java.lang.String",                          // callingFeatureId
                    "android.content.Intent",                    // intent
                    "java.lang.String",                          // resolvedType
                    "android.os.IBinder",                        // resultTo
                    "java.lang.String",                          // resultWho
                    "int",                                       // requestCode
                    "int",                                       // startFlags
                    "com.android.server.wm.SafeActivityOptions", // options
                    "int",                                       // userId
                    "java.lang.String",                          // reason
                    "boolean",                                   // validateIncomingUser
                    "com.android.server.am.PendingIntentRecord", // originatingPendingIntent
                    "boolean",                                   // allowBackgroundActivityStart
                ];

                if version == SdkVersion::Q {
                    params.remove(4);
                }

                params.insert(version.params().asc_task, version.task_class()); // inTask
                params
            }
        }
    }
}

/// A hooked launch call before any version-specific interpretation.
#[derive(Debug, Clone)]
pub struct RawLaunchEvent {
    pub entry: LaunchEntry,
    pub args: Vec<HookArg>,
}

/// Known framework layouts, the serialized name is the task class of that release.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, EnumIter, IntoStaticStr)]
pub enum SdkVersion {
    #[strum(serialize = "com.android.server.wm.TaskRecord")]
    Q = 29,
    #[strum(serialize = "com.android.server.wm.Task")]
    R = 30,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LaunchParams {
    pub atm_intent: usize,
    pub asc_intent: usize,
    pub asc_task: usize,
}

impl SdkVersion {
    /// Newer releases keep the latest known layout.
    pub fn from_sdk_int(sdk: i32) -> Result<Self> {
        match SdkVersion::iter().rev().find(|version| sdk >= *version as i32) {
            Some(version) => Ok(version),
            None => bail!("unsupported SDK version: {sdk}"),
        }
    }

    pub fn task_class(self) -> &'static str {
        self.into()
    }

    pub fn params(self) -> LaunchParams {
        match self {
            SdkVersion::Q => LaunchParams {
                atm_intent: 2,
                asc_intent: 4,
                asc_task: 12,
            },
            SdkVersion::R => LaunchParams {
                atm_intent: 3,
                asc_intent: 5,
                asc_task: 13,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchEvent {
    pub package: String,
    pub history_relaunch: bool,
}

#[derive(Debug, Clone)]
pub struct LaunchAdapter {
    version: SdkVersion,
    params: LaunchParams,
}

impl LaunchAdapter {
    pub fn new(version: SdkVersion) -> Self {
        Self {
            version,
            params: version.params(),
        }
    }

    pub fn for_sdk(sdk: i32) -> Result<Self> {
        Ok(Self::new(SdkVersion::from_sdk_int(sdk)?))
    }

    pub fn version(&self) -> SdkVersion {
        self.version
    }

    fn intent_at<'a>(args: &'a [HookArg], index: usize) -> Option<&'a Intent> {
        match args.get(index)? {
            HookArg::Intent(intent) => Some(intent),
            _ => None,
        }
    }

    fn task_at(args: &[HookArg], index: usize) -> Option<&TaskRecord> {
        match args.get(index)? {
            HookArg::Task(task) => Some(task),
            _ => None,
        }
    }

    /// `None` when the payload does not name a target package or is not a history relaunch.
    pub fn resolve(&self, raw: &RawLaunchEvent) -> Option<LaunchEvent> {
        match raw.entry {
            LaunchEntry::StartActivityAsUser => {
                let intent = Self::intent_at(&raw.args, self.params.atm_intent)?;
                let component = intent.component.as_ref()?;

                Some(LaunchEvent {
                    package: component.package.clone(),
                    history_relaunch: false,
                })
            }
            LaunchEntry::StartActivityInPackage => {
                let intent = Self::intent_at(&raw.args, self.params.asc_intent)?;

                if !intent.has_flag(FLAG_ACTIVITY_LAUNCHED_FROM_HISTORY) {
                    return None;
                }

                let task = Self::task_at(&raw.args, self.params.asc_task)?;
                let component = task.real_activity.as_ref()?;

                Some(LaunchEvent {
                    package: component.package.clone(),
                    history_relaunch: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_with(len: usize, placed: &[(usize, HookArg)]) -> Vec<HookArg> {
        let mut args = vec![HookArg::Null; len];
        for (index, arg) in placed {
            args[*index] = arg.clone();
        }
        args
    }

    fn intent(package: &str, flags: i32) -> HookArg {
        HookArg::Intent(Intent {
            component: Some(ComponentName::new(package, format!("{package}.MainActivity"))),
            flags,
        })
    }

    fn task(package: &str) -> HookArg {
        HookArg::Task(TaskRecord {
            real_activity: Some(ComponentName::new(package, ".Main")),
        })
    }

    #[test]
    fn sdk_versions_map_to_layouts() {
        assert_eq!(SdkVersion::from_sdk_int(29).unwrap(), SdkVersion::Q);
        assert_eq!(SdkVersion::from_sdk_int(30).unwrap(), SdkVersion::R);
        assert_eq!(SdkVersion::from_sdk_int(33).unwrap(), SdkVersion::R);
        assert!(SdkVersion::from_sdk_int(28).is_err());
    }

    #[test]
    fn signature_agrees_with_parameter_table() {
        for version in SdkVersion::iter() {
            let params = version.params();

            let atm = LaunchEntry::StartActivityAsUser.signature(version);
            assert_eq!(atm[params.atm_intent], "android.content.Intent", "{version:?}");

            let asc = LaunchEntry::StartActivityInPackage.signature(version);
            assert_eq!(asc[params.asc_intent], "android.content.Intent", "{version:?}");
            assert_eq!(asc[params.asc_task], version.task_class(), "{version:?}");
        }

        assert_eq!(LaunchEntry::StartActivityAsUser.signature(SdkVersion::Q).len(), 12);
        assert_eq!(LaunchEntry::StartActivityInPackage.signature(SdkVersion::R).len(), 18);
    }

    #[test]
    fn direct_start_resolves_intent_component() {
        let adapter = LaunchAdapter::new(SdkVersion::R);
        let raw = RawLaunchEvent {
            entry: LaunchEntry::StartActivityAsUser,
            args: args_with(13, &[(3, intent("com.example.a", 0))]),
        };

        assert_eq!(
            adapter.resolve(&raw),
            Some(LaunchEvent {
                package: "com.example.a".into(),
                history_relaunch: false
            })
        );
    }

    #[test]
    fn direct_start_uses_version_specific_index() {
        let raw = RawLaunchEvent {
            entry: LaunchEntry::StartActivityAsUser,
            args: args_with(12, &[(2, intent("com.example.q", 0))]),
        };

        assert!(LaunchAdapter::new(SdkVersion::R).resolve(&raw).is_none());
        assert_eq!(
            LaunchAdapter::new(SdkVersion::Q).resolve(&raw).unwrap().package,
            "com.example.q"
        );
    }

    #[test]
    fn implicit_intent_is_ignored() {
        let adapter = LaunchAdapter::new(SdkVersion::R);
        let raw = RawLaunchEvent {
            entry: LaunchEntry::StartActivityAsUser,
            args: args_with(13, &[(3, HookArg::Intent(Intent::default()))]),
        };

        assert!(adapter.resolve(&raw).is_none());
    }

    #[test]
    fn history_relaunch_reads_task_real_activity() {
        let adapter = LaunchAdapter::new(SdkVersion::R);
        let raw = RawLaunchEvent {
            entry: LaunchEntry::StartActivityInPackage,
            args: args_with(
                18,
                &[
                    (5, intent("com.launcher", FLAG_ACTIVITY_LAUNCHED_FROM_HISTORY)),
                    (13, task("com.example.recent")),
                ],
            ),
        };

        assert_eq!(
            adapter.resolve(&raw),
            Some(LaunchEvent {
                package: "com.example.recent".into(),
                history_relaunch: true
            })
        );
    }

    #[test]
    fn in_package_start_without_history_flag_is_ignored() {
        let adapter = LaunchAdapter::new(SdkVersion::Q);
        let raw = RawLaunchEvent {
            entry: LaunchEntry::StartActivityInPackage,
            args: args_with(
                17,
                &[(4, intent("com.example", 0)), (12, task("com.example"))],
            ),
        };

        assert!(adapter.resolve(&raw).is_none());
    }

    #[test]
    fn short_or_mistyped_payload_is_ignored() {
        let adapter = LaunchAdapter::new(SdkVersion::R);

        let short = RawLaunchEvent {
            entry: LaunchEntry::StartActivityAsUser,
            args: vec![HookArg::Object],
        };
        assert!(adapter.resolve(&short).is_none());

        let mistyped = RawLaunchEvent {
            entry: LaunchEntry::StartActivityInPackage,
            args: args_with(
                18,
                &[
                    (5, intent("com.example", FLAG_ACTIVITY_LAUNCHED_FROM_HISTORY)),
                    (13, HookArg::Str("not a task".into())),
                ],
            ),
        };
        assert!(adapter.resolve(&mistyped).is_none());
    }
}
