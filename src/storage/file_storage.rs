use crate::{
    domain::{relocate_task, Board, ProjectId, SectionId, TaskId},
    error::{HlaviError, Result},
    storage::PersistenceGateway,
};
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};

/// File-based store: one JSON document per project board
pub struct FileStorage {
    root_path: PathBuf,
    // Serializes read-modify-write cycles; concurrent section reorders
    // would otherwise overwrite each other.
    write_lock: Mutex<()>,
}

impl FileStorage {
    const HLAVI_DIR: &'static str = ".hlavi";
    const BOARDS_DIR: &'static str = "boards";

    /// Creates a new FileStorage instance for the given project root
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root_path: project_root.as_ref().join(Self::HLAVI_DIR),
            write_lock: Mutex::new(()),
        }
    }

    fn boards_dir(&self) -> PathBuf {
        self.root_path.join(Self::BOARDS_DIR)
    }

    fn board_file(&self, project_id: &ProjectId) -> PathBuf {
        self.boards_dir()
            .join(format!("{}.json", project_id.as_str().replace(['/', '\\'], "_")))
    }

    async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).await?;
        }
        Ok(())
    }

    /// Creates the `.hlavi/boards` directory structure
    pub async fn initialize(&self) -> Result<()> {
        self.ensure_directory_exists(&self.boards_dir()).await
    }

    pub async fn is_initialized(&self) -> bool {
        self.boards_dir().exists()
    }

    /// Writes a whole board, replacing what is stored for its project
    pub async fn save_board(&self, board: &Board) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_board(board).await
    }

    async fn write_board(&self, board: &Board) -> Result<()> {
        self.ensure_directory_exists(&self.boards_dir()).await?;

        let json = serde_json::to_string_pretty(board)?;
        fs::write(self.board_file(&board.project_id), json)
            .await
            .with_context(|| format!("writing board {}", board.project_id))?;
        Ok(())
    }

    async fn read_board(&self, path: &Path) -> Result<Board> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let board: Board = serde_json::from_str(&contents)?;
        Ok(board)
    }

    async fn load_board(&self, project_id: &ProjectId) -> Result<Board> {
        let file_path = self.board_file(project_id);

        if !file_path.exists() {
            return Err(HlaviError::BoardNotInitialized(project_id.to_string()));
        }

        self.read_board(&file_path).await
    }

    /// Finds the board holding a section. Section ids are global, so every
    /// stored board is a candidate.
    async fn find_board_with_section(&self, section_id: &SectionId) -> Result<Board> {
        let boards_dir = self.boards_dir();

        if boards_dir.exists() {
            let mut entries = fs::read_dir(&boards_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some("json") {
                    continue;
                }
                let board = self.read_board(&path).await?;
                if board.section(section_id).is_some() {
                    return Ok(board);
                }
            }
        }

        Err(HlaviError::SectionNotFound(section_id.to_string()))
    }
}

#[async_trait]
impl PersistenceGateway for FileStorage {
    async fn reorder_section(&self, section_id: &SectionId, order: u32) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut board = self.find_board_with_section(section_id).await?;
        if let Some(section) = board.section_mut(section_id) {
            section.order = order;
        }
        self.write_board(&board).await
    }

    async fn move_task(
        &self,
        task_id: &TaskId,
        section_id: &SectionId,
        order: u32,
        project_id: &ProjectId,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut board = self.load_board(project_id).await?;
        board.normalize();
        relocate_task(&mut board, task_id, section_id, order as usize)?;
        self.write_board(&board).await
    }

    async fn fetch_board(&self, project_id: &ProjectId) -> Result<Board> {
        let mut board = self.load_board(project_id).await?;
        board.normalize();
        Ok(board)
    }
}
