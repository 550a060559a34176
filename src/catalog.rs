//! The transforms that let a deployed application swap code and resources in place.
//!
//! Every hook is a static method of [`HOOKS_CLASS`], which ships in the instrumentation payload.
use crate::{
    dex::{ClassRef, MethodRef},
    transform::{EntryHook, ExitHook, HookRef, ModifyParameter, Transform},
    types::method_descriptor::InvalidDescriptor,
};

/// The class declaring every hook.
pub const HOOKS_CLASS: &str = "com/android/tools/deploy/instrument/InstrumentationHooks";

fn target(class: &str, name: &str, descriptor: &str) -> Result<MethodRef, InvalidDescriptor> {
    Ok(MethodRef::new(
        ClassRef::new(class),
        name,
        descriptor.parse()?,
    ))
}

fn hook(name: &str) -> HookRef {
    HookRef::new(ClassRef::new(HOOKS_CLASS), name)
}

fn entry(target: MethodRef, hook_name: &str) -> Transform {
    EntryHook::new(target, hook(hook_name))
        .this_as_object(true)
        .into()
}

fn exit(target: MethodRef, hook_name: &str) -> Transform {
    ExitHook::new(target, hook(hook_name)).into()
}

/// The transforms needed to swap resource overlays into a running application.
///
/// # Errors
/// Returns [`InvalidDescriptor`] if a target descriptor is malformed.
pub fn overlay_swap() -> Result<Vec<Transform>, InvalidDescriptor> {
    Ok(vec![
        ModifyParameter::new(
            target(
                "android/app/ApplicationLoaders",
                "getClassLoader",
                "(Ljava/lang/String;IZLjava/lang/String;Ljava/lang/String;Ljava/lang/ClassLoader;\
                 Ljava/lang/String;Ljava/lang/String;Ljava/util/List;)Ljava/lang/ClassLoader;",
            )?,
            3,
            hook("modifyNativeSearchPath"),
        )
        .into(),
        entry(
            target(
                "java/lang/Thread",
                "dispatchUncaughtException",
                "(Ljava/lang/Throwable;)V",
            )?,
            "logUnhandledException",
        ),
        exit(
            target(
                "dalvik/system/DexPathList",
                "splitDexPath",
                "(Ljava/lang/String;)Ljava/util/List;",
            )?,
            "handleSplitDexPathExit",
        ),
        exit(
            target(
                "android/app/LoadedApk",
                "getResources",
                "()Landroid/content/res/Resources;",
            )?,
            "addResourceOverlays",
        ),
        entry(
            target(
                "android/app/ResourcesManager",
                "applyNewResourceDirsLocked",
                "(Landroid/content/pm/ApplicationInfo;[Ljava/lang/String;)V",
            )?,
            "addResourceOverlays",
        ),
    ])
}

/// The transforms needed to apply code changes to a running application.
///
/// # Errors
/// Returns [`InvalidDescriptor`] if a target descriptor is malformed.
pub fn apply_changes() -> Result<Vec<Transform>, InvalidDescriptor> {
    let broadcast = target(
        "android/app/ActivityThread",
        "handleDispatchPackageBroadcast",
        "(I[Ljava/lang/String;)V",
    )?;
    Ok(vec![
        entry(broadcast.clone(), "handleDispatchPackageBroadcastEntry"),
        exit(broadcast, "handleDispatchPackageBroadcastExit"),
        entry(
            target(
                "dalvik/system/DexPathList$Element",
                "findResource",
                "(Ljava/lang/String;)Ljava/net/URL;",
            )?,
            "handleFindResourceEntry",
        ),
    ])
}
