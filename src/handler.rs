use std::path::{Path, PathBuf};

use crate::debug::DebugSink;
use crate::error::RayError;
use crate::film::Film;
use crate::scene::Scene;
use crate::trace::{self, RenderParams};

/// Fluent render pipeline. The first failing step records its error and
/// every later step short-circuits; `finish` hands the error back.
pub struct Handler {
    err: Option<RayError>,
    script_path: PathBuf,
    scene: Option<Scene>,
    film: Option<Film>,
    sink: DebugSink,
    pub params: RenderParams,
}

impl Handler {
    pub fn new(params: RenderParams) -> Handler {
        let sink = DebugSink::new(params.debug_trace);
        Handler {
            err: None,
            script_path: PathBuf::new(),
            scene: None,
            film: None,
            sink,
            params,
        }
    }

    pub fn set_script_path(mut self, path: &Path) -> Handler {
        if self.err.is_some() {
            return self;
        }
        self.script_path = path.to_path_buf();
        self
    }

    pub fn pre_check(mut self) -> Handler {
        if self.err.is_some() {
            return self;
        }
        if !self.script_path.exists() {
            self.err = Some(RayError::ScriptNotFound(self.script_path.clone()));
        }
        self
    }

    pub fn load_script(mut self) -> Handler {
        if self.err.is_some() {
            return self;
        }
        match Scene::from_script_file(&self.script_path) {
            Ok(scene) => {
                match scene.cameras.get(self.params.camera) {
                    Some(camera) => self.film = Some(Film::new(&camera.film_shape())),
                    None => {
                        self.err = Some(RayError::scene(format!(
                            "scene has no camera {}",
                            self.params.camera
                        )))
                    }
                }
                self.scene = Some(scene);
            }
            Err(err) => self.err = Some(err),
        }
        self
    }

    pub fn render(mut self) -> Handler {
        if self.err.is_some() {
            return self;
        }
        match (self.scene.as_ref(), self.film.as_mut()) {
            (Some(scene), Some(film)) => {
                if let Err(err) = trace::render(scene, film, &self.params, &self.sink) {
                    self.err = Some(err);
                }
            }
            _ => self.err = Some(RayError::scene("render requires a loaded script")),
        }
        self
    }

    /// Folds a previously saved film into this run's result.
    pub fn merge_film(mut self, path: Option<&Path>) -> Handler {
        if self.err.is_some() {
            return self;
        }
        let path = match path {
            Some(path) => path,
            None => return self,
        };
        let film = match self.film.as_mut() {
            Some(film) => film,
            None => {
                self.err = Some(RayError::scene("merge_film requires a rendered film"));
                return self;
            }
        };
        match Film::load(path) {
            Ok(prior) => {
                if let Err(err) = film.merge(&prior) {
                    self.err = Some(err);
                }
            }
            Err(err) => self.err = Some(err),
        }
        self
    }

    pub fn save_film(mut self, path: Option<&Path>) -> Handler {
        if self.err.is_some() {
            return self;
        }
        if let Some(path) = path {
            match self.film.as_ref() {
                Some(film) => {
                    if let Err(err) = film.save(path) {
                        self.err = Some(err);
                    }
                }
                None => self.err = Some(RayError::scene("save_film requires a rendered film")),
            }
        }
        self
    }

    pub fn save_img(mut self, path: &Path) -> Handler {
        if self.err.is_some() {
            return self;
        }
        match self.film.as_ref() {
            Some(film) => {
                if let Err(err) = film.save_png(path) {
                    self.err = Some(err);
                }
            }
            None => self.err = Some(RayError::scene("save_img requires a rendered film")),
        }
        self
    }

    pub fn save_debug_info(mut self, path: Option<&Path>) -> Handler {
        if self.err.is_some() {
            return self;
        }
        if let Some(path) = path {
            if let Err(err) = self.sink.save(path) {
                self.err = Some(err);
            }
        }
        self
    }

    pub fn film(&self) -> Option<&Film> {
        self.film.as_ref()
    }

    pub fn finish(self) -> Result<(), RayError> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
