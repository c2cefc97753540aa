/*!
LanRoom持久化模块

将用户、设备令牌和房间序列化为单个JSON文档：
- 写入临时文件后原子重命名，崩溃时磁盘上只可能是旧快照或新快照
- 会话令牌不落盘
*/

use crate::credentials::UserRecord;
use crate::error::ControlError;
use crate::rooms::Room;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// 持久化快照
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    #[serde(default)]
    pub users: HashMap<String, UserRecord>,
    #[serde(default)]
    pub device_bags: HashMap<String, String>,
    #[serde(default)]
    pub rooms: HashMap<String, Room>,
}

/// 借用形式的快照，用于编码时避免复制
#[derive(Serialize)]
pub struct SnapshotRef<'a> {
    pub users: &'a HashMap<String, UserRecord>,
    pub device_bags: &'a HashMap<String, String>,
    pub rooms: &'a HashMap<String, Room>,
}

/// 临时文件路径：`<path>.tmp`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(".tmp");
    PathBuf::from(raw)
}

/// 加载快照；文件不存在时返回空快照
pub fn load(path: &Path) -> Result<Snapshot, ControlError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("No state file at {}, starting empty", path.display());
            return Ok(Snapshot::default());
        }
        Err(e) => return Err(ControlError::Io(e)),
    };

    let snapshot: Snapshot = serde_json::from_slice(&data).map_err(|e| {
        ControlError::CorruptState(format!("decode {}: {}", path.display(), e))
    })?;

    log::info!(
        "Loaded state from {}: {} users, {} device tokens, {} rooms",
        path.display(),
        snapshot.users.len(),
        snapshot.device_bags.len(),
        snapshot.rooms.len()
    );
    Ok(snapshot)
}

/// 编码快照
pub fn encode(snapshot: &SnapshotRef<'_>) -> Result<Vec<u8>, ControlError> {
    serde_json::to_vec_pretty(snapshot)
        .map_err(|e| ControlError::Internal(format!("encode state: {}", e)))
}

/// 原子写入：临时文件 -> 刷盘 -> 重命名
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;

    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    sync_dir(dir);

    log::debug!("State saved to {} ({} bytes)", path.display(), data.len());
    Ok(())
}

/// 状态文件所在目录；裸文件名对应当前目录
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// 刷新目录项，使重命名在掉电后仍然有效
///
/// 重命名已经完成，这里失败时内存与磁盘中的新快照一致，只记录警告。
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            log::warn!("Failed to sync directory {}: {}", dir.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

/// 保存快照
pub fn save(path: &Path, snapshot: &SnapshotRef<'_>) -> Result<(), ControlError> {
    let data = encode(snapshot)?;
    write_atomic(path, &data)?;
    Ok(())
}
