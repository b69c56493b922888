// 1. Traits
pub use crate::calendar::Calculator;
pub use crate::model::{Regressor, TrainedModel, quantile::QuantileRegressor};
pub use crate::source::DataSource;
pub use crate::table::{Table, TableName, ToCsv};

// 2. Tables
pub use crate::calendar::{CalendarCol, CalendarTable};
pub use crate::model::{Forecast, ForecastSummary, SummaryLevel};
pub use crate::modeling::{ModelingCol, ModelingTable};

// 3. Calendar calculators
pub use crate::calendar::{
    date_attributes::{DateAttribute, DateAttributes},
    date_range::DateRangeGenerator,
    events::{Event, EventsCountdown},
    holidays::Holidays,
    menu::{MenuRecord, SpecialMeals, meals_composition},
    non_working_days::NonWorkingDays,
    school_year::SchoolYears,
    strikes::Strikes,
    working_days::WorkingDays,
};

// 4. Modeling stages
pub use crate::modeling::{
    entities::Entities,
    join::{assemble, cross_product},
    split::{SplitWindows, TrainPredictSplit, TrainPredictSplitter, compute_min_max_date},
    statistics::{add_statistical_features, tag_outliers},
};

// 5. Models
pub use crate::model::{
    FeatureImportance, ForecastFiles, TrainingData, baseline::StatisticalBaseline, forecast, model_features,
    quantile::{GroupQuantile, QuantileInterval},
};

// 6. Errors
pub use crate::error::{
    DataError, DateError, ForecastError, ForecastResult, IoError, ModelError, SplitError,
    SystemError,
};

// 7. Configuration & sources
pub use crate::config::{FilterPolicy, PipelineConfig, Target};
pub use crate::pipeline::Pipeline;
pub use crate::source::{DataDir, Dataset, MemorySource, SpecialDishes};
