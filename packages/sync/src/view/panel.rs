//! 会話パネルのライフサイクル
//!
//! ```text
//! Closed → Opening → Open → Closing → Closed
//! ```
//!
//! 遷移のたびに世代を進めます。非同期の処理は開始時の世代を覚えておき、
//! その世代がまだ最新のときだけ結果を反映します。

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelPhase {
    #[default]
    Closed,
    Opening,
    Open,
    Closing,
}

impl PanelPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

#[derive(Debug, Default)]
pub struct Panel {
    phase: PanelPhase,
    generation: u64,
}

impl Panel {
    pub fn phase(&self) -> PanelPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// `Opening` または `Open`
    pub fn is_active(&self) -> bool {
        matches!(self.phase, PanelPhase::Opening | PanelPhase::Open)
    }

    pub fn begin_open(&mut self) -> u64 {
        self.transition(PanelPhase::Opening)
    }

    pub fn begin_close(&mut self) -> u64 {
        self.transition(PanelPhase::Closing)
    }

    /// `generation` で始めた遷移を完了させる
    pub fn finish(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        match self.phase {
            PanelPhase::Opening => self.phase = PanelPhase::Open,
            PanelPhase::Closing => self.phase = PanelPhase::Closed,
            PanelPhase::Open | PanelPhase::Closed => return false,
        }
        true
    }

    /// 途中で失敗した opening を取りやめる
    pub fn abort(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) || self.phase != PanelPhase::Opening {
            return false;
        }
        self.transition(PanelPhase::Closed);
        true
    }

    /// 実行中の処理を無効にして `Closed` にする
    pub fn reset(&mut self) {
        self.transition(PanelPhase::Closed);
    }

    fn transition(&mut self, phase: PanelPhase) -> u64 {
        self.phase = phase;
        self.generation += 1;
        self.generation
    }
}
