//! Installer - カタログと launch point の同期
//!
//! - 初回スキャン完了で保存済み launch point を読み込み、DEFAULT を補い、
//!   保留していたリクエストを到着順に再実行する
//! - インストールで DEFAULT を登録し、アンインストールでそのアプリの launch point を全部消す
//! - 実行中のアプリはアンインストールできない

use tracing::{info, warn};

use crate::domain::app::AppDescription;
use crate::domain::errors::AppMgrError;
use crate::domain::events::{LaunchPointChange, LifecycleEvent};
use crate::lifecycle::manager::AppManager;
use crate::queue::Readiness;

impl AppManager {
    pub(crate) fn on_catalog_scanned(&mut self, apps: Vec<AppDescription>) {
        let scanned = apps.len();
        for app in apps {
            self.catalog.install(app);
        }

        if !self.catalog_ready {
            let catalog = &self.catalog;
            match self.launch_points.restore(|app_id| catalog.contains(app_id)) {
                Ok(restored) => info!(restored, "launch points restored"),
                Err(e) => warn!(error = %e, "could not load stored launch points"),
            }
        }

        let apps: Vec<_> = self.catalog.iter().cloned().collect();
        for app in apps {
            self.add_default_point(&app);
        }
        self.emit(LifecycleEvent::CatalogChanged);

        if self.catalog_ready {
            return;
        }
        self.catalog_ready = true;
        let deferred = self.pending.release(Readiness::CatalogScan);
        info!(apps = scanned, replayed = deferred.len(), "catalog ready");
        for task in deferred {
            self.dispatch(task);
        }
    }

    pub(crate) fn install(&mut self, app: AppDescription) -> Result<(), AppMgrError> {
        if app.id.is_empty() {
            return Err(AppMgrError::validation("app id is empty"));
        }
        let app_id = app.id.clone();
        if self.catalog.install(app.clone()).is_some() {
            info!(%app_id, "app updated");
        } else {
            info!(%app_id, "app installed");
        }
        // 失敗してもカタログには載せたまま。DEFAULT は次のスキャンで補う
        self.add_default_point(&app);
        self.emit(LifecycleEvent::CatalogChanged);
        Ok(())
    }

    pub(crate) fn uninstall(&mut self, app_id: &str) -> Result<(), AppMgrError> {
        if !self.catalog.contains(app_id) {
            return Err(AppMgrError::not_found("app", app_id));
        }
        if !self.running.instances_of(app_id).is_empty() {
            return Err(AppMgrError::conflict(format!(
                "{app_id} is running and cannot be uninstalled"
            )));
        }
        self.catalog.uninstall(app_id);
        let removed = self.launch_points.remove_by_app_id(app_id);
        info!(%app_id, launch_points = removed.len(), "app uninstalled");
        for point in removed {
            self.emit(LifecycleEvent::LaunchPointChanged {
                change: LaunchPointChange::Removed,
                launch_point: point.to_json(),
            });
        }
        self.emit(LifecycleEvent::CatalogChanged);
        Ok(())
    }

    fn add_default_point(&mut self, app: &AppDescription) {
        match self.launch_points.ensure_default(app) {
            Ok(true) => self.publish_point(&app.id, LaunchPointChange::Added),
            Ok(false) => {}
            Err(e) => warn!(app_id = %app.id, error = %e, "could not register default launch point"),
        }
    }

    /// DEFAULT launch point の変化を通知する
    fn publish_point(&mut self, app_id: &str, change: LaunchPointChange) {
        let Some(point) = self.launch_points.get_by_app_id(app_id) else {
            return;
        };
        let launch_point = point.to_json();
        self.emit(LifecycleEvent::LaunchPointChanged {
            change,
            launch_point,
        });
    }
}
