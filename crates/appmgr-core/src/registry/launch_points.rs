//! LaunchPointRegistry - launch point の所有者
//!
//! # 不変条件
//! - DEFAULT はアプリごとに 1 つ、id は `appId + "_default"`
//! - BOOKMARK の id は払い出し時点でレジストリ内で一意
//! - 永続化に失敗したらメモリ上の変更は行わない（fail closed）
//! - 並び順は挿入順。`sort()` / `sort_by_position()` で明示的に並べ替える

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::domain::app::AppDescription;
use crate::domain::errors::AppMgrError;
use crate::domain::launch_point::{
    LaunchPoint, LaunchPointRecord, LaunchPointType, default_launch_point_id,
};
use crate::ports::{Clock, LaunchPointStore};

pub struct LaunchPointRegistry {
    points: Vec<LaunchPoint>,
    store: Box<dyn LaunchPointStore>,
    clock: Arc<dyn Clock>,
    bookmark_attempt_limit: u32,
}

impl LaunchPointRegistry {
    pub fn new(
        store: Box<dyn LaunchPointStore>,
        clock: Arc<dyn Clock>,
        bookmark_attempt_limit: u32,
    ) -> Self {
        Self {
            points: Vec::new(),
            store,
            clock,
            bookmark_attempt_limit: bookmark_attempt_limit.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LaunchPoint> {
        self.points.iter()
    }

    pub fn create_default(&self, app_id: &str) -> Result<LaunchPoint, AppMgrError> {
        if app_id.is_empty() {
            return Err(AppMgrError::validation("appId is empty"));
        }
        Ok(LaunchPoint::new(
            default_launch_point_id(app_id),
            app_id.to_string(),
            LaunchPointType::Default,
        ))
    }

    /// BOOKMARK を作る（まだ登録はしない）。
    /// title / icon はアプリの記述から引き継ぎ、`fields` の表示用フィールドで上書きする
    pub fn create_bookmark(
        &self,
        app: &AppDescription,
        fields: &Value,
    ) -> Result<LaunchPoint, AppMgrError> {
        if app.id.is_empty() {
            return Err(AppMgrError::validation("appId is empty"));
        }
        let id = self.generate_bookmark_id(&app.id)?;
        let mut point = LaunchPoint::new(id, app.id.clone(), LaunchPointType::Bookmark);
        point.title = app.title.clone();
        point.icon = app.icon.clone();
        point.apply_fields(fields);
        Ok(point)
    }

    /// `appId_<suffix>` を毎回引き直して、未使用のものが出るまで繰り返す。
    /// suffix はマイクロ秒 + 乱数で、試行回数には上限がある。
    fn generate_bookmark_id(&self, app_id: &str) -> Result<String, AppMgrError> {
        for _ in 0..self.bookmark_attempt_limit {
            let micros = u64::from(self.clock.now().timestamp_subsec_micros());
            let jitter = rand::random::<u32>() % 1000;
            let candidate = format!("{app_id}_{}", micros * 1000 + u64::from(jitter));
            if self.get_by_launch_point_id(&candidate).is_none() {
                return Ok(candidate);
            }
            debug!(%candidate, "bookmark id collision, drawing again");
        }
        Err(AppMgrError::conflict(format!(
            "could not allocate a launch point id for {app_id}"
        )))
    }

    /// 永続化してからメモリに追加する。position がなければ末尾の位置を振る
    pub fn add(&mut self, mut point: LaunchPoint) -> Result<&LaunchPoint, AppMgrError> {
        if point.launch_point_id().is_empty() || point.app_id().is_empty() {
            return Err(AppMgrError::validation("launch point without id"));
        }
        if self.get_by_launch_point_id(point.launch_point_id()).is_some() {
            return Err(AppMgrError::conflict(format!(
                "launch point {} already exists",
                point.launch_point_id()
            )));
        }
        if point.position.is_none() {
            point.position = Some(self.next_position());
        }
        self.store.insert(&point.to_record())?;
        self.points.push(point);
        let last = self.points.len() - 1;
        Ok(&self.points[last])
    }

    /// DEFAULT を引く（id を計算するだけで探索しない）
    pub fn get_by_app_id(&self, app_id: &str) -> Option<&LaunchPoint> {
        if app_id.is_empty() {
            return None;
        }
        self.get_by_launch_point_id(&default_launch_point_id(app_id))
    }

    pub fn get_by_launch_point_id(&self, launch_point_id: &str) -> Option<&LaunchPoint> {
        if launch_point_id.is_empty() {
            return None;
        }
        self.points
            .iter()
            .find(|p| p.launch_point_id() == launch_point_id)
    }

    /// アプリの launch point を DEFAULT / BOOKMARK まとめて削除する。
    /// ストアからの削除に失敗しても続行し、ログに残す
    pub fn remove_by_app_id(&mut self, app_id: &str) -> Vec<LaunchPoint> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.points)
            .into_iter()
            .partition(|p| p.app_id() == app_id);
        self.points = kept;
        for point in &removed {
            if let Err(e) = self.store.delete(point.launch_point_id()) {
                warn!(launch_point_id = point.launch_point_id(), error = %e, "failed to delete launch point record");
            }
        }
        removed
    }

    pub fn remove_by_launch_point_id(
        &mut self,
        launch_point_id: &str,
    ) -> Result<LaunchPoint, AppMgrError> {
        let Some(index) = self
            .points
            .iter()
            .position(|p| p.launch_point_id() == launch_point_id)
        else {
            return Err(AppMgrError::not_found("launch point", launch_point_id));
        };
        self.store.delete(launch_point_id)?;
        Ok(self.points.remove(index))
    }

    /// 表示用フィールドを更新して永続化する。変化がなければ書き込まない
    pub fn update(
        &mut self,
        launch_point_id: &str,
        fields: &Value,
    ) -> Result<&LaunchPoint, AppMgrError> {
        let index = self.index_of(launch_point_id)?;
        let mut updated = self.points[index].clone();
        if updated.apply_fields(fields) {
            self.store.update(launch_point_id, &display_fields(&updated))?;
            self.points[index] = updated;
        }
        Ok(&self.points[index])
    }

    /// 並び順を変え、全エントリの position を振り直して永続化する
    pub fn move_to(
        &mut self,
        launch_point_id: &str,
        position: usize,
    ) -> Result<&LaunchPoint, AppMgrError> {
        let index = self.index_of(launch_point_id)?;
        if self.points[index].unmovable {
            return Err(AppMgrError::validation(format!(
                "launch point {launch_point_id} is unmovable"
            )));
        }
        let target = position.min(self.points.len() - 1);

        let mut reordered = self.points.clone();
        let point = reordered.remove(index);
        reordered.insert(target, point);

        for (pos, point) in reordered.iter_mut().enumerate() {
            let pos = u32::try_from(pos).unwrap_or(u32::MAX);
            if point.position != Some(pos) {
                point.position = Some(pos);
                self.store
                    .update(point.launch_point_id(), &json!({"position": pos}))?;
            }
        }
        self.points = reordered;
        Ok(&self.points[target])
    }

    /// タイトル順（安定ソート）
    pub fn sort(&mut self) {
        self.points
            .sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
    }

    /// position 順。position のないものは末尾、相対順は維持
    pub fn sort_by_position(&mut self) {
        self.points
            .sort_by_key(|p| p.position.unwrap_or(u32::MAX));
    }

    /// 表示対象（visible）だけを現在の順序で
    pub fn to_json(&self) -> Vec<Value> {
        self.points
            .iter()
            .filter(|p| p.visible)
            .map(LaunchPoint::to_json)
            .collect()
    }

    /// タイトルの部分一致（大文字小文字を区別しない）
    pub fn search(&self, keyword: &str) -> Vec<Value> {
        let keyword = keyword.to_lowercase();
        self.points
            .iter()
            .filter(|p| p.visible && p.title.to_lowercase().contains(&keyword))
            .map(LaunchPoint::to_json)
            .collect()
    }

    /// 保存済みレコードを読み込む。`known_app` が false を返すアプリのレコードは捨てる。
    /// 既にメモリにある id は上書きしない。読み込んだ件数を返す
    pub fn restore(&mut self, known_app: impl Fn(&str) -> bool) -> Result<usize, AppMgrError> {
        let records = self.store.load_all()?;
        let mut restored = 0;
        for record in records {
            if !known_app(&record.app_id) {
                debug!(launch_point_id = %record.launch_point_id, "dropping record of unknown app");
                if let Err(e) = self.store.delete(&record.launch_point_id) {
                    warn!(error = %e, "failed to delete stale launch point record");
                }
                continue;
            }
            if self
                .get_by_launch_point_id(&record.launch_point_id)
                .is_some()
            {
                continue;
            }
            self.points.push(LaunchPoint::from_record(record));
            restored += 1;
        }
        self.sort_by_position();
        Ok(restored)
    }

    /// DEFAULT がまだなければアプリの記述から作って登録する
    pub fn ensure_default(&mut self, app: &AppDescription) -> Result<bool, AppMgrError> {
        if self.get_by_app_id(&app.id).is_some() {
            return Ok(false);
        }
        let mut point = self.create_default(&app.id)?;
        point.title = app.title.clone();
        point.icon = app.icon.clone();
        point.visible = app.visible;
        self.add(point)?;
        Ok(true)
    }

    fn next_position(&self) -> u32 {
        let len = u32::try_from(self.points.len()).unwrap_or(u32::MAX);
        self.points
            .iter()
            .filter_map(|p| p.position.map(|pos| pos.saturating_add(1)))
            .max()
            .unwrap_or(0)
            .max(len)
    }

    fn index_of(&self, launch_point_id: &str) -> Result<usize, AppMgrError> {
        self.points
            .iter()
            .position(|p| p.launch_point_id() == launch_point_id)
            .ok_or_else(|| AppMgrError::not_found("launch point", launch_point_id))
    }
}

fn display_fields(point: &LaunchPoint) -> Value {
    let LaunchPointRecord {
        title,
        icon,
        bg_image,
        bg_color,
        tile_size,
        unmovable,
        visible,
        params,
        ..
    } = point.to_record();
    json!({
        "title": title,
        "icon": icon,
        "bgImage": bg_image,
        "bgColor": bg_color,
        "tileSize": tile_size,
        "unmovable": unmovable,
        "visible": visible,
        "params": params,
    })
}
